// Thin namespace wrapper for HTTP-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod routes {
    pub use crate::routes::*;
}

pub mod webhook_handler {
    pub use crate::webhook_handler::*;
}

pub mod webhook_models {
    pub use crate::webhook_models::*;
}
