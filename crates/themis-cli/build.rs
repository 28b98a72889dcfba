//! Emits the `VERGEN_*` variables shown by `themis --version`.

use vergen_git2::{BuildBuilder, CargoBuilder, Emitter, Git2Builder, RustcBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Outside a git checkout the sha falls back to "unknown" at runtime.
    let git = Git2Builder::default().sha(true).dirty(true).build()?;
    let build_date = BuildBuilder::default().build_date(true).build()?;
    let target = CargoBuilder::default().target_triple(true).build()?;
    let rustc = RustcBuilder::default().semver(true).build()?;

    Emitter::default()
        .add_instructions(&git)?
        .add_instructions(&build_date)?
        .add_instructions(&target)?
        .add_instructions(&rustc)?
        .emit()?;

    Ok(())
}
