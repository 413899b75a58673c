pub mod mse;
pub mod state_driven;
