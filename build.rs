use std::io::Result;

fn main() -> Result<()> {
    if std::env::var_os("PROTOC").is_none() {
        if let Ok(protoc) = protoc_bin_vendored::protoc_bin_path() {
            std::env::set_var("PROTOC", protoc);
        }
    }
    prost_build::compile_protos(&["./src/heapdump.proto"], &["./src"])?;
    built::write_built_file().expect("Failed to acquire build-time information");
    Ok(())
}
