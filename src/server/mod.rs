mod http;

pub use http::{Server, Verified, build_gate, router};
