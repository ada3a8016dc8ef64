use std::fmt;

use vellum_device::DeviceError;

/// Errors surfaced by the renderer.
///
/// A missing or lost device is not an error for state setters; those only
/// update their mirrors. The variants here are the failures a caller must
/// handle.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A device-facing operation was requested before any device was attached.
    NoDevice,
    /// The device rejected a vertex stream or index buffer bind.
    CannotBindStream { source: DeviceError },
    /// The device failed to allocate a batch resource.
    ResourceCreation { source: DeviceError },
    /// The requested batch capacity is zero, not a multiple of 4, or exceeds 16-bit indexing.
    InvalidBatchCapacity { requested: usize },
    /// A single drawable produced more vertices than the whole batch can hold.
    BatchOverflow { requested: usize, capacity: usize },
    /// An indexed payload whose vertex count does not describe whole quads.
    MisalignedQuadVertices { count: usize },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::NoDevice => write!(f, "No render device has been created"),
            RenderError::CannotBindStream { source } => {
                write!(f, "Cannot bind vertex stream: {}", source)
            }
            RenderError::ResourceCreation { source } => {
                write!(f, "Failed to create batch resource: {}", source)
            }
            RenderError::InvalidBatchCapacity { requested } => write!(
                f,
                "Invalid batch capacity {}: must be a non-zero multiple of 4 no larger than {}",
                requested,
                crate::batch::MAX_VERTEX_CAPACITY
            ),
            RenderError::BatchOverflow {
                requested,
                capacity,
            } => write!(
                f,
                "Drawable emits {} vertices but the batch only holds {}",
                requested, capacity
            ),
            RenderError::MisalignedQuadVertices { count } => {
                write!(f, "Indexed geometry needs whole quads, got {} vertices", count)
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::CannotBindStream { source } | RenderError::ResourceCreation { source } => {
                Some(source)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn bind_failure_keeps_its_source() {
        let err = RenderError::CannotBindStream {
            source: DeviceError::Lost,
        };
        assert!(err.to_string().contains("Cannot bind vertex stream"));
        assert!(err.source().is_some());
    }

    #[test]
    fn capacity_error_names_the_limit() {
        let err = RenderError::InvalidBatchCapacity { requested: 6 };
        assert!(err.to_string().contains("65536"));
    }
}
