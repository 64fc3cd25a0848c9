mod checkpoint;
mod device;
mod keyword;
mod pending;
mod record;
mod risk;
mod stats;

pub use checkpoint::*;
pub use device::*;
pub use keyword::*;
pub use pending::*;
pub use record::*;
pub use risk::*;
pub use stats::*;
