pub(crate) mod compile;

pub(crate) use compile::command_compile;
