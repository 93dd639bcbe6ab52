pub use crate::form::validators::future_date;
pub use crate::form::{
    FieldKey, FieldLens, FieldProps, FieldSpec, FieldStatus, FormController, FormError, FormModel,
    FormOptions, FormResult, FormSchema, Refined, SetOptions, UnknownFields, ValidationError,
    Value, ValueKind,
};
