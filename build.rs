//! Build script for ticobot-rag.
//!
//! No codegen or asset pipeline is needed; this only pins cargo's
//! rebuild trigger to the script itself.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
}
