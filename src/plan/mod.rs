pub mod generator;
pub mod layout;
pub mod normalize;
pub mod records;
pub mod request;
pub mod types;

pub use generator::PlanGenerator;
pub use types::UserInput;
