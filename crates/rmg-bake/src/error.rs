use rmg_opstream::StreamError;
use thiserror::Error;

use crate::{PassRef, Res};

///Invalid declarations. Most of those are reported at the declaring call already, the rest while ingesting a stream.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Stream does not start with a set-brief record")]
    MissingBrief,
    #[error("Set-brief record appeared twice")]
    DuplicateBrief,
    #[error("{kind} id {id} exceeds the {count} declared in the brief")]
    IdOutOfRange {
        kind: &'static str,
        id: u32,
        count: u32,
    },
    #[error("{kind} id {id} is registered twice")]
    DuplicateId { kind: &'static str, id: u32 },
    #[error("Unknown or destroyed {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u32 },
    #[error("Unknown resource {0}")]
    UnknownResource(Res),
    #[error("Pass {pass} writes {resource} without declaring an output alias")]
    MissingOutputAlias { pass: PassRef, resource: Res },
    #[error("Pass {pass} writes {resource} into itself, output alias must be a distinct handle")]
    OutputAliasNotDistinct { pass: PassRef, resource: Res },
    #[error("Pass {pass} writes {resource} into {output}, which is already an alias of another resource")]
    ForeignOutputAlias {
        pass: PassRef,
        resource: Res,
        output: Res,
    },
    #[error("Pass {pass} binds slot {binding} more than once")]
    BindingSlotReused { pass: PassRef, binding: u32 },
    #[error("Version {resource} is overwritten by {first} and {second}")]
    VersionWrittenTwice {
        resource: Res,
        first: PassRef,
        second: PassRef,
    },
    #[error("Version {resource} is produced by {first} and {second}")]
    OutputProducedTwice {
        resource: Res,
        first: PassRef,
        second: PassRef,
    },
    #[error("Image '{image}' is render sized, its format is derived and can't be set to {format}")]
    DerivedFormatOverride { image: String, format: String },
    #[error("Render sized image {0} declared, but the graph has no render extent")]
    NoRenderExtent(Res),
    #[error("Invalid {field} value {value}")]
    InvalidValue { field: &'static str, value: u32 },
    #[error("Brief declares {count} {kind} entries, a stream of this size holds at most {limit} records")]
    CountExceedsStream {
        kind: &'static str,
        count: u32,
        limit: usize,
    },
}

///Failures that can only be detected while ordering the graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Cyclic dependency between {producer} and {consumer}")]
    CyclicDependency { producer: PassRef, consumer: PassRef },
    #[error("Internal scheduling error: {producer} is ordered after its dependee {consumer}")]
    OrderViolation { producer: PassRef, consumer: PassRef },
}

#[derive(Debug, Error)]
pub enum AliasError {
    #[error("Alias {alias} references unknown or destroyed base {base}")]
    UnknownBase { alias: Res, base: Res },
    #[error("Alias {alias} references unknown or destroyed resource")]
    UnknownAlias { alias: Res },
    #[error("{alias} is already an alias of {base}")]
    AlreadyAliased { alias: Res, base: Res },
    #[error("Aliasing {alias} onto {base} would create a cycle")]
    Cycle { alias: Res, base: Res },
    #[error("Alias {alias} does not match the descriptor of its base {base}")]
    DescriptorMismatch { alias: Res, base: Res },
}

///Any reason a bake can fail. A failed bake never publishes a partial schedule.
#[derive(Debug, Error)]
pub enum BakeError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("Alias error: {0}")]
    Alias(#[from] AliasError),
    #[error("Op-stream error: {0}")]
    Stream(#[from] StreamError),
}
