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

use crate::backend::{run_tool, ToolRunner};
use crate::file_reader::FileReader;
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::fs;
use std::path::Path;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum ImageKind {
    None,
    Iso,
}

/// Bootloader configuration: zero timeout, one multiboot2 entry loading
/// the staged kernel.
pub fn limine_config(volume_id: &str) -> String {
    format!(
        "TIMEOUT=0\n\n:{}\nPROTOCOL=multiboot2\nKERNEL_PATH=boot:///kernel.elf\n",
        volume_id
    )
}

/// Wraps a linked kernel in a bootable ISO-9660/Joliet image: stages
/// kernel.elf, limine.sys and a generated limine.cfg, authors the image
/// with a no-emulation El Torito boot record, then runs the bootloader's
/// deploy tool against it.
pub fn build_iso<F: FileReader>(
    kernel: &Path,
    iso: &Path,
    volume_id: &str,
    limine_dir: &Path,
    reader: &F,
    tools: &dyn ToolRunner,
) -> Result<()> {
    let staging = iso.with_extension("iso_root");
    fs::create_dir_all(&staging)
        .with_context(|| format!("Failed to create staging dir {}", staging.display()))?;

    fs::copy(kernel, staging.join("kernel.elf"))
        .with_context(|| format!("Failed to stage kernel {}", kernel.display()))?;

    for file in ["limine.sys", "limine-cd.bin"] {
        let content = reader
            .read_binary(&limine_dir.join(file))
            .with_context(|| format!("Failed to read bootloader file {}", file))?;
        fs::write(staging.join(file), content)
            .with_context(|| format!("Failed to stage bootloader file {}", file))?;
    }

    fs::write(staging.join("limine.cfg"), limine_config(volume_id))
        .context("Failed to write limine.cfg")?;

    run_tool(
        tools,
        "xorriso",
        &[
            "-as".to_string(),
            "mkisofs".to_string(),
            "-J".to_string(),
            "-V".to_string(),
            volume_id.to_string(),
            "-b".to_string(),
            "limine-cd.bin".to_string(),
            "-no-emul-boot".to_string(),
            "-boot-load-size".to_string(),
            "4".to_string(),
            "-boot-info-table".to_string(),
            staging.display().to_string(),
            "-o".to_string(),
            iso.display().to_string(),
        ],
    )
    .context("Failed during ISO authoring")?;

    run_tool(tools, "limine-deploy", &[iso.display().to_string()])
        .context("Failed during bootloader deploy")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockToolRunner;
    use crate::file_reader::MockFileReader;

    #[test]
    fn test_limine_config_contents() {
        let cfg = limine_config("TestOS");
        assert!(cfg.is_ascii());
        assert!(cfg.contains("TIMEOUT=0"));
        assert!(cfg.contains("PROTOCOL=multiboot2"));
        assert!(cfg.contains("KERNEL_PATH=boot:///kernel.elf"));
        assert!(cfg.contains(":TestOS"));
    }

    #[test]
    fn test_build_iso_stages_and_deploys() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = dir.path().join("kernel.elf");
        fs::write(&kernel, b"\x7fELF").unwrap();

        let mut reader = MockFileReader::default();
        reader.add_binary_file("/limine/limine.sys", b"sys");
        reader.add_binary_file("/limine/limine-cd.bin", b"cd");

        let tools = MockToolRunner::default();
        let iso = dir.path().join("kernel.iso");
        build_iso(
            &kernel,
            &iso,
            "TestOS",
            Path::new("/limine"),
            &reader,
            &tools,
        )
        .unwrap();

        let staging = dir.path().join("kernel.iso_root");
        assert!(staging.join("kernel.elf").exists());
        assert_eq!(fs::read(staging.join("limine.sys")).unwrap(), b"sys");
        assert_eq!(
            fs::read_to_string(staging.join("limine.cfg")).unwrap(),
            limine_config("TestOS")
        );

        let calls = tools.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "xorriso");
        assert!(calls[0].1.contains(&"-no-emul-boot".to_string()));
        assert!(calls[0].1.contains(&"TestOS".to_string()));
        assert_eq!(calls[1].0, "limine-deploy");
        assert_eq!(calls[1].1, vec![iso.display().to_string()]);
    }
}
