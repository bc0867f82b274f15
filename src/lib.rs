/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

pub mod backend;
pub mod errors;
pub mod file_reader;
pub mod image;
pub mod lir;
pub mod lowerer;
pub mod metadata;

use anyhow::{Context, Result};
use backend::{OutputFormat, TargetArch, ToolRunner};
use errors::CompileError;
use file_reader::FileReader;
use image::ImageKind;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Options {
    pub output: PathBuf,
    pub format: OutputFormat,
    pub image: ImageKind,
    pub arch: TargetArch,
    pub limine_dir: PathBuf,
}

/// Full pipeline: load module, lower to LIR, emit assembly, assemble,
/// link, optionally wrap in a bootable image. Returns the path of the
/// final artifact.
pub fn compile<F: FileReader>(
    input: &Path,
    options: &Options,
    reader: &F,
    tools: &dyn ToolRunner,
) -> Result<PathBuf> {
    if options.format == OutputFormat::Bin && options.image == ImageKind::Iso {
        return Err(CompileError::ConfigError {
            reason: "a raw binary cannot be packaged into a bootable image, use --format elf"
                .to_string(),
        }
        .into());
    }

    let module = metadata::read_module(input, reader).context("Failed during module loading")?;

    let mut arch = backend::select_architecture(options.arch, options.format);

    let unit = lowerer::lower_module(&module, arch.pointer_size())
        .context("Failed during lowering stage")?;

    arch.initialize();
    let assembly = arch
        .compile(&unit.instructions)
        .context("Failed during code generation stage")?;

    let asm_path = options.output.with_extension("asm");
    fs::write(&asm_path, assembly)
        .with_context(|| format!("Failed to write assembly file {}", asm_path.display()))?;

    match options.format {
        OutputFormat::Bin => {
            arch.assemble(&asm_path, &options.output, tools)
                .context("Failed during assembling stage")?;
        }
        OutputFormat::Elf => {
            let object_path = options.output.with_extension("o");
            arch.assemble(&asm_path, &object_path, tools)
                .context("Failed during assembling stage")?;
            arch.link(&object_path, &options.output, tools)
                .context("Failed during linking stage")?;
        }
    }

    if options.image == ImageKind::Iso {
        let iso_path = options.output.with_extension("iso");
        image::build_iso(
            &options.output,
            &iso_path,
            &unit.name,
            &options.limine_dir,
            reader,
            tools,
        )
        .context("Failed during image stage")?;
        return Ok(iso_path);
    }

    Ok(options.output.clone())
}
