use serde::Deserialize;
use simple_form::form::{FieldKey, FieldLens, FormSchema, ValueKind};

#[allow(dead_code)]
#[derive(Deserialize, simple_form::form::FormSchema)]
struct SignupForm {
    #[form(email)]
    email: String,
    #[form(min_length = 8, max_length = 64)]
    password: String,
    #[form(min = 13, integer)]
    age: Option<u32>,
    #[form(one_of("basic", "pro"))]
    plan: String,
}

fn main() {
    let fields = SignupForm::fields();
    assert_eq!(fields.email().key().as_str(), "email");
    assert_eq!(FieldKey::from(fields.plan()), FieldKey::new("plan"));

    let model = SignupForm::model().expect("model builds");
    assert_eq!(model.len(), 4);
    let age = model.field(fields.age().key()).expect("age spec");
    assert!(age.is_optional());
    assert_eq!(age.kind(), ValueKind::Number);
}
