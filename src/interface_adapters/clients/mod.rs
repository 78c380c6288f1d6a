pub mod economy;

pub use economy::EconomyClient;
