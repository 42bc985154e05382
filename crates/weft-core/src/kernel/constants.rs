/// Framework name
pub const APP_NAME: &str = "Weft";

/// Framework version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the worker every component runs on unless told otherwise.
pub const DEFAULT_WORKER: &str = "main";

/// Implementation id of the nested configuration launcher.
pub const CONFIG_LAUNCHER: &str = "weft::ConfigLauncher";

/// Separator between a group name and its index in expanded keys.
pub const GROUP_SEPARATOR: char = '#';

/// Context signals announcing published and withdrawn objects.
pub const OBJECT_REGISTERED_SIG: &str = "object_registered";
pub const OBJECT_RELEASED_SIG: &str = "object_released";

/// Separator between an owner uid and an endpoint name.
pub const ENDPOINT_SEPARATOR: char = '.';

/// Built-in object type names.
pub const OBJECT_TYPE: &str = "Object";
pub const INTEGER_TYPE: &str = "Integer";
pub const FLOAT_TYPE: &str = "Float";
pub const STRING_TYPE: &str = "String";
pub const BOOLEAN_TYPE: &str = "Boolean";
pub const COMPOSITE_TYPE: &str = "Composite";
