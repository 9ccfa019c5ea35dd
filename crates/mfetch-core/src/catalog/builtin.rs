//! Built-in artifact table used when no catalog file is configured.
//!
//! URL fragments are origin-relative in the `<org>/<repo>/resolve/main/<file>`
//! form served by the model hub and its mirrors. Sizes are approximate and
//! only drive progress display and the installed-size check; 0 means unknown.

use super::artifact::{Artifact, FileDescriptor};

const MIB: u64 = 1024 * 1024;

pub fn builtin_artifacts() -> Vec<Artifact> {
    vec![
        Artifact::new(
            "qwen2.5-coder-0.5b-instruct-q4",
            "Qwen2.5 Coder 0.5B Instruct, GGUF Q4_K_M (small, CPU friendly)",
        )
        .with_required(FileDescriptor::new(
            "qwen2.5-coder-0.5b-instruct-q4_k_m.gguf",
            "Qwen/Qwen2.5-Coder-0.5B-Instruct-GGUF/resolve/main/qwen2.5-coder-0.5b-instruct-q4_k_m.gguf",
            398 * MIB,
        )),
        Artifact::new(
            "qwen2.5-coder-1.5b-instruct-q4",
            "Qwen2.5 Coder 1.5B Instruct, GGUF Q4_K_M",
        )
        .with_required(FileDescriptor::new(
            "qwen2.5-coder-1.5b-instruct-q4_k_m.gguf",
            "Qwen/Qwen2.5-Coder-1.5B-Instruct-GGUF/resolve/main/qwen2.5-coder-1.5b-instruct-q4_k_m.gguf",
            1066 * MIB,
        )),
        Artifact::new(
            "qwen2.5-coder-1.5b-instruct",
            "Qwen2.5 Coder 1.5B Instruct, safetensors with tokenizer",
        )
        .with_required(FileDescriptor::new(
            "model.safetensors",
            "Qwen/Qwen2.5-Coder-1.5B-Instruct/resolve/main/model.safetensors",
            2950 * MIB,
        ))
        .with_required(FileDescriptor::new(
            "config.json",
            "Qwen/Qwen2.5-Coder-1.5B-Instruct/resolve/main/config.json",
            0,
        ))
        .with_required(FileDescriptor::new(
            "tokenizer.json",
            "Qwen/Qwen2.5-Coder-1.5B-Instruct/resolve/main/tokenizer.json",
            7 * MIB,
        ))
        .with_optional(FileDescriptor::new(
            "generation_config.json",
            "Qwen/Qwen2.5-Coder-1.5B-Instruct/resolve/main/generation_config.json",
            0,
        )),
    ]
}
