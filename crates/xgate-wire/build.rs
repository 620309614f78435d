fn main() {
    prost_build::compile_protos(&["proto/pbnetwork.proto"], &["proto/"])
        .expect("failed to compile pbnetwork.proto");
}
