pub mod health;
pub mod local;
pub mod traits;

pub use health::HealthProber;
pub use local::LocalRuntime;
pub use traits::ServiceRuntime;
