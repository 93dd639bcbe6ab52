extern crate self as simple_form;

pub mod form;
pub mod prelude;

#[cfg(test)]
mod test_public_api;
