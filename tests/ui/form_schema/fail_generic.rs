#[derive(simple_form::form::FormSchema)]
struct Wrapper<T> {
    value: T,
}

fn main() {}
