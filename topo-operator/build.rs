fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The server half is only used by the in-process registry in tests.
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/topo.proto"], &["proto"])?;
    Ok(())
}
