use std::io::Write;

use crate::codec::{self, Arg, WriteError};

/// A command waiting to be written: its name and positional arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub name: String,
    pub args: Vec<Arg>,
}

impl Request {
    pub fn new<I, A>(name: &str, args: I) -> Request
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        Request {
            name: name.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn write_to<W: Write>(&self, dst: &mut W) -> Result<usize, WriteError> {
        codec::write_request(dst, &self.name, &self.args)
    }
}
