//! # Weft Registry Errors
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("A factory for implementation '{implementation}' is already registered")]
    DuplicateFactory { implementation: String },

    #[error("No factory registered for implementation '{implementation}'")]
    UnknownImplementation { implementation: String },

    #[error("Identifier '{uid}' is already in use")]
    DuplicateUid { uid: String },

    #[error("No live instance with identifier '{uid}'")]
    UnknownUid { uid: String },

    #[error("Object type '{type_name}' is not registered")]
    UnknownObjectType { type_name: String },

    #[error("Object type '{type_name}' is already registered")]
    DuplicateObjectType { type_name: String },
}
