// Build script to compile Protocol Buffer definitions

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile protobuf files (server and client stubs)
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["../../proto/telemetry.proto"], &["../../proto/"])?;

    // Tell Cargo to rerun if proto files change
    println!("cargo:rerun-if-changed=../../proto/telemetry.proto");

    Ok(())
}
