//! External programs driven by the synthesizer.

use std::path::Path;

use tokio::process::Command;

use super::SynthError;
use crate::config::Tool;

/// Values substituted into a tool's argument template.
#[derive(Debug, Clone, Default)]
pub struct Invocation<'a> {
    pub input: Option<&'a Path>,
    pub output: Option<&'a Path>,
    /// Spliced in place of a bare `{flags}` argument.
    pub flags: Vec<String>,
}

impl Invocation<'_> {
    /// Expands `template` into the final argument list.
    pub fn args(&self, template: &[String]) -> Vec<String> {
        let display =
            |path: Option<&Path>| path.map(|p| p.display().to_string()).unwrap_or_default();
        let (input, output) = (display(self.input), display(self.output));
        let mut args = Vec::with_capacity(template.len() + self.flags.len());
        for arg in template {
            if arg == "{flags}" {
                args.extend(self.flags.iter().cloned());
                continue;
            }
            let expanded = arg
                .replace("{input}", &input)
                .replace("{output}", &output)
                .replace("{flags}", &self.flags.join(" "));
            if !expanded.is_empty() {
                args.push(expanded);
            }
        }
        args
    }
}

/// Fails with [`SynthError::ToolMissing`] unless `tool` points at a file.
/// Bare program names are left to the `PATH` lookup at spawn time.
pub fn ensure_present(tool: &Tool, role: &'static str) -> Result<(), SynthError> {
    let path = &tool.path;
    let bare = path.components().count() == 1 && !path.is_absolute();
    if path.as_os_str().is_empty() || (!bare && !path.is_file()) {
        return Err(SynthError::ToolMissing {
            role,
            path: path.clone(),
        });
    }
    Ok(())
}

/// Runs `tool` to completion. A non-zero exit is [`SynthError::Subprocess`].
pub async fn run(tool: &Tool, invocation: &Invocation<'_>) -> Result<(), SynthError> {
    let name = tool.path.display().to_string();
    let args = invocation.args(&tool.args);
    tracing::debug!(tool = %name, args = ?args, "running tool");
    let output = Command::new(&tool.path)
        .args(&args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| SynthError::Spawn {
            tool: name.clone(),
            source,
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::warn!(tool = %name, status = %output.status, "{}", stderr.trim());
        let status = match output.status.code() {
            Some(code) => format!("exit code {code}"),
            None => output.status.to_string(),
        };
        return Err(SynthError::Subprocess { tool: name, status });
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        tracing::trace!(tool = %name, "{}", stdout.trim());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::PathBuf;

    use super::*;

    /// Writes an executable `/bin/sh` script into `dir`.
    #[cfg(unix)]
    pub(crate) fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn flags_are_spliced_and_placeholders_filled() {
        let invocation = Invocation {
            input: Some(Path::new("/w/in.il")),
            output: Some(Path::new("/w/out.dll")),
            flags: vec!["/x64".into(), "/PE64".into()],
        };
        let template = Tool::assembler("ilasm").args;
        assert_eq!(
            invocation.args(&template),
            ["/w/in.il", "/out:/w/out.dll", "/dll", "/x64", "/PE64"]
        );
        let none = Invocation::default();
        assert_eq!(none.args(&["{flags}".into(), "-v".into()]), ["-v"]);
    }

    #[test]
    fn missing_tool_paths_are_reported() {
        let tool = Tool::disassembler("/definitely/not/here/ildasm");
        assert!(matches!(
            ensure_present(&tool, "disassembler"),
            Err(SynthError::ToolMissing { role: "disassembler", .. })
        ));
        ensure_present(&Tool::disassembler("ildasm"), "disassembler").unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_status_decides_success() {
        let dir = tempfile::tempdir().unwrap();
        let ok = script(dir.path(), "ok.sh", "cp \"$1\" \"$2\"");
        let input = dir.path().join("a.txt");
        let output = dir.path().join("b.txt");
        std::fs::write(&input, "payload").unwrap();
        let tool = Tool {
            path: ok,
            args: vec!["{input}".into(), "{output}".into()],
        };
        let invocation = Invocation {
            input: Some(&input),
            output: Some(&output),
            flags: Vec::new(),
        };
        run(&tool, &invocation).await.unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "payload");

        let failing = Tool {
            path: script(dir.path(), "fail.sh", "echo broken >&2\nexit 3"),
            args: vec!["{input}".into()],
        };
        let err = run(&failing, &invocation).await.unwrap_err();
        assert!(matches!(&err, SynthError::Subprocess { status, .. } if status == "exit code 3"));
    }
}
