// Build script to generate the tonic client and server for `llm.LLMService`.
//
// The message types are declared by hand in `src/lib.rs` and mirror
// `proto/llm.proto`, so only the service plumbing is generated here.

fn main() {
    let generate_stream = tonic_build::manual::Method::builder()
        .name("generate_stream")
        .route_name("GenerateStream")
        .input_type("crate::GenerateRequest")
        .output_type("crate::TokenChunk")
        .codec_path("tonic::codec::ProstCodec")
        .server_streaming()
        .build();

    let stop_server = tonic_build::manual::Method::builder()
        .name("stop_server")
        .route_name("StopServer")
        .input_type("crate::StopRequest")
        .output_type("crate::StopResponse")
        .codec_path("tonic::codec::ProstCodec")
        .build();

    let service = tonic_build::manual::Service::builder()
        .name("LLMService")
        .package("llm")
        .method(generate_stream)
        .method(stop_server)
        .build();

    tonic_build::manual::Builder::new()
        .build_server(true)
        .build_client(true)
        .compile(&[service]);

    // Re-run build if the wire contract changes
    println!("cargo:rerun-if-changed=proto/llm.proto");
    println!("cargo:rerun-if-changed=build.rs");
}
