use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let proto_root = manifest_dir.join("../../proto").canonicalize()?;
    let vaxsight_dir = proto_root.join("vaxsight");

    let proto_files = ["vision.proto"]
        .into_iter()
        .map(|name| vaxsight_dir.join(name))
        .collect::<Vec<_>>();

    for file in &proto_files {
        println!("cargo:rerun-if-changed={}", file.display());
    }

    let protoc = protoc_bin_vendored::protoc_bin_path()?;
    // tonic-build resolves the compiler through PROTOC, so point it at the
    // vendored binary before codegen runs.
    unsafe {
        env::set_var("PROTOC", protoc);
    }

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&proto_files, &[proto_root])?;

    Ok(())
}
