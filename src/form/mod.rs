mod binding;
mod controller;
mod refine;
mod schema;
mod validation;
pub mod validators;


pub use binding::{ChangeHandler, FieldProps};
pub use controller::{
    FieldMeta, FormController, FormError, FormId, FormOptions, FormResult, FormSnapshot,
    SetOptions, SubmitState, UnknownFields, ValidationTicket,
};
pub use refine::{Email, EmailAddress, NonEmpty, PositiveInteger, Refined, Refinement};
pub use schema::{
    Check, FieldKey, FieldLens, FieldSpec, FieldType, FormModel, FormModelBuilder, FormSchema,
    ValueKind,
};
pub use serde_json::Value;
pub use simple_form_derive::FormSchema;
pub use validation::{
    AsyncFieldValidator, BoxedValidationFuture, FieldStatus, FieldValidator, FormValues,
    ValidationError,
};
