use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        WavyteError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(WavyteError::script("x").to_string().contains("script error:"));
    assert!(
        WavyteError::resource("x")
            .to_string()
            .contains("resource error:")
    );
    assert!(WavyteError::export("x").to_string().contains("export error:"));
    assert!(
        WavyteError::evaluation("x")
            .to_string()
            .contains("evaluation error:")
    );
    assert!(
        WavyteError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = WavyteError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn json_errors_map_to_serde() {
    let err: WavyteError = serde_json::from_str::<u32>("nope").unwrap_err().into();
    assert!(matches!(err, WavyteError::Serde(_)));
}
