use super::*;

#[test]
fn builtins_are_registered_in_sorted_order() {
    let reg = ExporterRegistry::with_builtins();
    assert_eq!(reg.ids(), vec!["ffmpeg", "image-sequence"]);
    let exporter = reg.create("image-sequence", &serde_json::Value::Null).unwrap();
    assert_eq!(exporter.meta().id, "image-sequence");
}

#[test]
fn unknown_ids_list_the_available_exporters() {
    let reg = ExporterRegistry::with_builtins();
    let err = reg
        .create("webm", &serde_json::json!({}))
        .err()
        .unwrap()
        .to_string();
    assert_eq!(
        err,
        "export error: unknown exporter 'webm' (available: ffmpeg, image-sequence)"
    );
}

#[test]
fn invalid_options_are_validation_errors() {
    let reg = ExporterRegistry::with_builtins();
    let err = reg
        .create("image-sequence", &serde_json::json!({ "digits": "six" }))
        .err()
        .unwrap();
    assert!(matches!(err, WavyteError::Validation(_)), "{err}");
    let err = reg
        .create("image-sequence", &serde_json::json!({ "queue": 0 }))
        .err()
        .unwrap();
    assert!(err.to_string().contains("queue"));
}

#[test]
fn registering_an_id_again_replaces_it() {
    let mut reg = ExporterRegistry::empty();
    reg.register("x", |_| Err(WavyteError::export("first")));
    reg.register("x", |_| Err(WavyteError::export("second")));
    let err = reg.create("x", &serde_json::Value::Null).err().unwrap();
    assert_eq!(err.to_string(), "export error: second");
}

#[test]
fn acknowledgments_release_tracked_frames() {
    let mut acks = FrameAcks::new();
    let tx = acks.sender();
    acks.track(FrameIndex(0));
    acks.track(FrameIndex(1));
    acks.track(FrameIndex(2));
    assert_eq!(acks.in_flight(), 3);

    assert!(tx.ack(FrameIndex(1)));
    assert!(tx.ack(FrameIndex(7)));
    assert_eq!(acks.drain(), 1, "unknown frames are ignored");
    assert_eq!(acks.in_flight(), 2);

    let from_thread = tx.clone();
    std::thread::spawn(move || {
        from_thread.ack(FrameIndex(0));
        from_thread.ack(FrameIndex(2));
    })
    .join()
    .unwrap();
    assert_eq!(acks.drain(), 2);
    assert_eq!(acks.in_flight(), 0);

    drop(acks);
    assert!(!tx.ack(FrameIndex(3)));
}
