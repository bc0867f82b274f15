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

pub mod amd64;

use crate::errors::CompileError;
use crate::lir::Instruction;
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::cell::RefCell;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Flat binary straight out of the assembler.
    Bin,
    /// Linked freestanding ELF executable.
    Elf,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum TargetArch {
    Amd64,
}

/// The architecture seam: lowering talks to the rest of the pipeline
/// through this interface only.
pub trait Architecture {
    fn pointer_size(&self) -> u32;

    /// Resets emitter state and lays down the fixed prologue (boot
    /// header, entry stub, frame registers).
    fn initialize(&mut self);

    /// Translates the LIR sequence into assembly source text.
    fn compile(&mut self, instructions: &[Instruction]) -> Result<String>;

    /// Runs the external assembler over the emitted source file.
    fn assemble(&self, source: &Path, object: &Path, tools: &dyn ToolRunner) -> Result<()>;

    /// Links the object file into a freestanding ELF.
    fn link(&self, object: &Path, output: &Path, tools: &dyn ToolRunner) -> Result<()>;
}

pub fn select_architecture(arch: TargetArch, format: OutputFormat) -> Box<dyn Architecture> {
    match arch {
        TargetArch::Amd64 => Box::new(amd64::Amd64Architecture::new(format)),
    }
}

/// External child-process seam, with a recording mock so the assemble /
/// link / image stages are testable without the tools installed.
pub trait ToolRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<i32>;
}

// production runner
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<i32> {
        let status = Command::new(program)
            .args(args)
            .status()
            .with_context(|| format!("Failed to launch {}", program))?;
        Ok(status.code().unwrap_or(-1))
    }
}

// mock runner for testing
#[derive(Default)]
pub struct MockToolRunner {
    calls: RefCell<Vec<(String, Vec<String>)>>,
    exit_code: i32,
}

impl MockToolRunner {
    pub fn failing(exit_code: i32) -> Self {
        MockToolRunner {
            calls: RefCell::new(Vec::new()),
            exit_code,
        }
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.borrow().clone()
    }
}

impl ToolRunner for MockToolRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<i32> {
        self.calls
            .borrow_mut()
            .push((program.to_string(), args.to_vec()));
        Ok(self.exit_code)
    }
}

/// Runs one tool to completion and surfaces a non-zero exit as a fatal
/// tool error.
pub fn run_tool(tools: &dyn ToolRunner, program: &str, args: &[String]) -> Result<()> {
    let code = tools.run(program, args)?;
    if code != 0 {
        return Err(CompileError::ToolError {
            tool: program.to_string(),
            code,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_tool_surfaces_exit_code() {
        let tools = MockToolRunner::failing(3);
        let err = run_tool(&tools, "nasm", &[]).unwrap_err();
        let tool_err = err.downcast_ref::<CompileError>().unwrap();
        assert_eq!(
            *tool_err,
            CompileError::ToolError {
                tool: "nasm".to_string(),
                code: 3
            }
        );
    }

    #[test]
    fn test_mock_runner_records_invocations() {
        let tools = MockToolRunner::default();
        run_tool(&tools, "ld", &["-n".to_string()]).unwrap();
        assert_eq!(tools.calls(), vec![("ld".to_string(), vec!["-n".to_string()])]);
    }
}
