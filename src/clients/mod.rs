pub mod medlineplus;

pub use medlineplus::{MedlinePlusClient, UpstreamClient, UpstreamError};
