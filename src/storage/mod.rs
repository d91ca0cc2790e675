pub(crate) mod cells;
mod external;
mod owned;
mod tree;
mod value;
mod view;

pub use external::ParamsRef;
pub use owned::ParamsCopy;
pub use tree::ParamTree;
pub use value::{Param, ParameterValue};
pub use view::{Shape, View};
