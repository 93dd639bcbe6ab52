#[derive(simple_form::form::FormSchema)]
struct Comment {
    #[form(max_len = 280)]
    body: String,
}

fn main() {}
