
#[cfg(test)]
mod tests {
    use crate::app_config::error::ConfigurationError;
    use crate::kernel::error::Error;
    use crate::registry::error::RegistryError;
    use crate::thread::error::WorkerError;

    #[test]
    fn test_error_conversions() {
        let err: Error = RegistryError::UnknownUid { uid: "ghost".to_string() }.into();
        assert!(matches!(err, Error::Registry(_)));
        assert!(err.to_string().contains("ghost"));

        let err: Error = WorkerError::NoRuntime.into();
        assert!(matches!(err, Error::Worker(WorkerError::NoRuntime)));

        let err: Error = ConfigurationError::UnknownConfig { id: "main".to_string() }.into();
        assert!(err.is_configuration());

        let err: Error = "plain message".into();
        assert_eq!(err.to_string(), "Error: plain message");
    }
}
