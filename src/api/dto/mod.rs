//! Data Transfer Objects for REST request/response serialization.
//!
//! Domain entities are serialized directly where their shape already
//! matches the wire format; these types cover requests and composite
//! responses.

pub mod common_dto;
pub mod instance_dto;
pub mod payment_dto;
pub mod plan_dto;
pub mod subscription_dto;

pub use common_dto::*;
pub use instance_dto::*;
pub use payment_dto::*;
pub use plan_dto::*;
pub use subscription_dto::*;
