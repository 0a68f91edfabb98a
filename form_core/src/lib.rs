pub mod config;
pub mod field_array;
pub mod files;
pub mod form;
pub mod path;
pub mod payload;
pub mod schema;
pub mod store;
pub mod tabs;
pub mod validation;
pub mod value;

pub use config::{DynamicConfig, FieldConfig, FieldKind, FormSchema, SchemaError, SelectOption, TabConfig};
pub use field_array::{FieldArray, GuardError};
pub use files::{FileDiff, FileFieldState};
pub use form::{
    seed_from_entity, ChangeEvent, EntitySeed, Form, FormError, Submission, SubmitError,
    SubmitInProgress, SubmitOutcome, SubmitStart, SubmitState,
};
pub use path::{FieldPath, PathSegment};
pub use payload::{build_payload, Part, PartValue, Payload};
pub use schema::{CatalogError, SchemaCatalog};
pub use store::{EntityId, EntityStore};
pub use tabs::TabRouter;
pub use validation::{Failure, ValidationErrors};
pub use value::{EntryKey, FileItem, FileRef, FormValue, FormValues, GroupEntry, GroupRow, Upload};
