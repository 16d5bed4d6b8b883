//! Multi-stage Dockerfile rendering.
//!
//! Stages are emitted in wave order so every `FROM <stage>` refers to a
//! stage defined above it.

use crate::blueprint::{Blueprint, installer_argv};
use crate::stage::{Instruction, StageDef, StageError, StageSource};

pub fn render_dockerfile(blueprint: &Blueprint) -> Result<String, StageError> {
  let mut out = String::from("# syntax=docker/dockerfile:1\n");

  for wave in blueprint.graph()?.waves()? {
    for name in wave {
      out.push('\n');
      render_stage(&mut out, blueprint, blueprint.stage(name)?);
    }
  }

  Ok(out)
}

fn render_stage(out: &mut String, blueprint: &Blueprint, stage: &StageDef) {
  let from = match &stage.source {
    StageSource::Image(image) => image.as_str(),
    StageSource::Stage(parent) => parent.as_str(),
  };
  out.push_str(&format!("FROM {} AS {}\n", from, stage.name));

  for instruction in &stage.instructions {
    let line = match instruction {
      Instruction::Workdir { path } => format!("WORKDIR {}", path),
      Instruction::CopyManifest { src, dest } | Instruction::CopyTree { src, dest } => {
        format!("COPY {} {}", src, dest)
      }
      Instruction::InstallDependencies { manifest } => {
        let argv = installer_argv(blueprint.config(), manifest);
        let words: Vec<String> = argv.iter().map(|a| shell_word(a)).collect();
        format!("RUN {}", words.join(" "))
      }
      Instruction::Env { key, value } => format!("ENV {}={}", key, value),
      Instruction::Expose { port } => format!("EXPOSE {}", port),
      Instruction::Cmd { argv } => format!("CMD {}", exec_form(argv)),
    };
    out.push_str(&line);
    out.push('\n');
  }
}

/// JSON array form, so no shell is involved at container start.
fn exec_form(argv: &[String]) -> String {
  serde_json::to_string(argv).unwrap_or_else(|_| "[]".to_string())
}

fn shell_word(arg: &str) -> String {
  let safe = !arg.is_empty()
    && arg
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '=' | ':' | ','));
  if safe {
    arg.to_string()
  } else {
    format!("'{}'", arg.replace('\'', r"'\''"))
  }
}
