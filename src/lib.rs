pub mod error;
pub mod initialization;
pub mod layer;
pub mod locking;
pub mod optimization;
pub mod persistence;
pub mod precision;
pub mod specs;
pub mod storage;

pub use error::{ParamErr, Result};
pub use locking::LockingPolicy;
pub use precision::{Precision, PrecisionKind};
pub use storage::{Param, ParamTree, ParameterValue, ParamsCopy, ParamsRef, Shape, View};
