fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        unsafe {
            std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
        }
    }

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/arflow/v1/arflow.proto"], &["proto/"])?;

    println!("cargo:rerun-if-changed=proto/arflow/v1/arflow.proto");
    Ok(())
}
