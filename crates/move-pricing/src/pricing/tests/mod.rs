mod common;

mod harness;
mod import_export;
