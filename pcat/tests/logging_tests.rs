use pcat::{Error, setup_logging};

#[test]
fn only_the_first_install_takes_effect() {
    assert!(matches!(
        setup_logging("verbose", 0),
        Err(Error::InvalidArgumentError(_))
    ));
    setup_logging("warning", 3).unwrap();
    tracing::warn!("visible once installed");
    assert!(matches!(setup_logging("debug", 3), Err(Error::Internal(_))));
}
