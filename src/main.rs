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

use anyhow::Result;
use cilc::backend::{OutputFormat, ProcessRunner, TargetArch};
use cilc::file_reader::OsFileReader;
use cilc::image::ImageKind;
use cilc::Options;
use clap::Parser as clap_parser;
use std::path::PathBuf;

#[derive(clap_parser)]
#[clap(version = "0.1.0", author = "Connor Nolan")]
struct Opts {
    /// Module document produced by the metadata reader
    input: PathBuf,
    #[clap(short, long, default_value = "kernel.elf")]
    output: PathBuf,
    /// Raw binary or linked freestanding ELF
    #[clap(long, value_enum, default_value = "elf")]
    format: OutputFormat,
    /// Wrap the kernel in a bootable ISO
    #[clap(long, value_enum, default_value = "none")]
    image: ImageKind,
    #[clap(long, value_enum, default_value = "amd64")]
    arch: TargetArch,
    /// Directory holding limine.sys and limine-cd.bin
    #[clap(long, default_value = "/usr/share/limine")]
    limine: PathBuf,
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let opts: Opts = Opts::parse();

    let options = Options {
        output: opts.output.clone(),
        format: opts.format,
        image: opts.image,
        arch: opts.arch,
        limine_dir: opts.limine,
    };

    let reader = OsFileReader;
    let tools = ProcessRunner;
    let artifact = cilc::compile(&opts.input, &options, &reader, &tools)?;

    println!(
        "Successfully compiled {} to {}",
        opts.input.display(),
        artifact.display()
    );

    Ok(())
}
