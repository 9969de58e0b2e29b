fn main() {
    #[cfg(feature = "cuda")]
    build_kernels();
}

#[cfg(feature = "cuda")]
fn build_kernels() {
    use cuda_builder::CudaBuilder;

    CudaBuilder::new("../reduce_gpu")
        .copy_to("../resources/reduce_gpu.ptx")
        .build()
        .unwrap();
}
