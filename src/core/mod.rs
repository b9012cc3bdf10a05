// Domain-layer modules and shared errors/models
pub mod email_generation {
    pub use crate::email_generation::*;
}

pub mod metrics {
    pub use crate::metrics::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod pipeline {
    pub use crate::pipeline::*;
}

pub mod pricing {
    pub use crate::pricing::*;
}

pub mod errors {
    pub use crate::errors::*;
}
