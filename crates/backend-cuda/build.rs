//! Build script for wakefield-backend-cuda.
//!
//! Locates the CUDA toolkit and configures linking against libcufft when
//! the `cuda` feature is enabled.

fn main() {
    #[cfg(feature = "cuda")]
    {
        link_cufft();
    }
}

#[cfg(feature = "cuda")]
fn link_cufft() {
    // Installation path in order of preference: CUDA_PATH (Windows
    // convention), CUDA_HOME (Linux convention), then common defaults.
    let cuda_path = std::env::var("CUDA_PATH")
        .or_else(|_| std::env::var("CUDA_HOME"))
        .unwrap_or_else(|_| {
            let default_paths = ["/usr/local/cuda", "/opt/cuda", "/usr/lib/cuda"];
            for path in default_paths {
                if std::path::Path::new(path).exists() {
                    return path.to_string();
                }
            }
            // let the linker find it
            "/usr/local/cuda".to_string()
        });

    let lib_path = if cfg!(target_os = "windows") {
        format!("{}/lib/x64", cuda_path)
    } else if cfg!(target_arch = "x86_64") {
        let lib64 = format!("{}/lib64", cuda_path);
        if std::path::Path::new(&lib64).exists() {
            lib64
        } else {
            format!("{}/lib", cuda_path)
        }
    } else {
        format!("{}/lib", cuda_path)
    };

    println!("cargo:rustc-link-search=native={}", lib_path);
    println!("cargo:rustc-link-lib=cufft");

    println!("cargo:rerun-if-env-changed=CUDA_PATH");
    println!("cargo:rerun-if-env-changed=CUDA_HOME");
}
