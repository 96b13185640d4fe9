// Build script for Vulkan shader compilation
//
// Compiles res/shaders/*.{vert,frag} to SPIR-V next to the sources, so the
// runtime paths in the default config work when the app is run from this
// directory. Skips silently when no Vulkan SDK is installed; the prebuilt
// .spv files are checked for at runtime, not here.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=res/shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");

    let vulkan_sdk = match env::var("VULKAN_SDK") {
        Ok(sdk) => sdk,
        Err(_) => {
            eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
            return;
        }
    };

    let glslc = if cfg!(target_os = "windows") {
        format!("{}\\Bin\\glslc.exe", vulkan_sdk)
    } else {
        format!("{}/bin/glslc", vulkan_sdk)
    };
    if !Path::new(&glslc).exists() {
        eprintln!("warning: glslc not found at {}, shader compilation skipped", glslc);
        return;
    }

    let shader_dir = PathBuf::from("res/shaders");
    let entries = match std::fs::read_dir(&shader_dir) {
        Ok(entries) => entries,
        Err(_) => {
            eprintln!("info: no shader directory at {:?}", shader_dir);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_shader = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("vert") | Some("frag")
        );
        if !is_shader {
            continue;
        }

        let out_file = match path.file_name() {
            Some(name) => {
                let mut name = name.to_os_string();
                name.push(".spv");
                shader_dir.join(name)
            }
            None => continue,
        };

        let up_to_date = match (std::fs::metadata(&path), std::fs::metadata(&out_file)) {
            (Ok(src), Ok(dst)) => match (src.modified(), dst.modified()) {
                (Ok(src_time), Ok(dst_time)) => src_time <= dst_time,
                _ => false,
            },
            _ => false,
        };
        if up_to_date {
            continue;
        }

        let status = Command::new(&glslc).arg(&path).arg("-o").arg(&out_file).status();
        match status {
            Ok(s) if s.success() => {
                eprintln!("info: compiled {:?}", path.file_name().unwrap());
            }
            Ok(s) => {
                panic!(
                    "glslc failed for {:?} with exit code {}",
                    path,
                    s.code().unwrap_or(-1)
                );
            }
            Err(e) => {
                panic!("failed to run glslc for {:?}: {}", path, e);
            }
        }
    }
}
