pub mod apyhub;

pub use apyhub::ApyHubProvider;
