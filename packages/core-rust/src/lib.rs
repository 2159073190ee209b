//! Servitor Core — dynamic values, service identity, and the tri-state JSend result.

pub mod context;
pub mod result;
pub mod status;
pub mod value;

pub use context::{ServiceId, StepRef};
pub use result::{Parents, Payload, ResultBuilder, ResultError, ResultParts, ServiceResult, MAX_PARENT_DEPTH};
pub use status::{Code, Status};
pub use value::{Data, Value};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
