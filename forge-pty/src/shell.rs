/// Resolves the preferred shell program and argv, appending `-l` for POSIX
/// shells so spawned sessions behave like a login shell.
pub fn preferred_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
    if let Some(shell) = override_shell {
        return shell_invocation(shell);
    }
    if cfg!(windows) {
        return ("cmd.exe".to_string(), Vec::new());
    }
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string());
    shell_invocation(&shell)
}

fn shell_invocation(shell: &str) -> (String, Vec<String>) {
    if is_posix_shell(shell) {
        (shell.to_string(), vec!["-l".to_string()])
    } else {
        (shell.to_string(), Vec::new())
    }
}

fn is_posix_shell(shell: &str) -> bool {
    let name = shell.rsplit(['/', '\\']).next().unwrap_or(shell);
    !matches!(name, "cmd.exe" | "cmd" | "powershell.exe" | "powershell" | "pwsh.exe" | "pwsh")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    Posix,
    Cmd,
    PowerShell,
}

pub fn shell_kind(shell: &str) -> ShellKind {
    let name = shell.rsplit(['/', '\\']).next().unwrap_or(shell);
    match name {
        "cmd.exe" | "cmd" => ShellKind::Cmd,
        "powershell.exe" | "powershell" | "pwsh.exe" | "pwsh" => ShellKind::PowerShell,
        _ => ShellKind::Posix,
    }
}

/// Builds the shell-appropriate `cd` command injected into a child's stdin
/// when a late-joining subscriber pins the session's working directory.
pub fn cd_command(kind: ShellKind, directory: &str) -> Vec<u8> {
    let line = match kind {
        ShellKind::Posix => format!("cd -- '{}'\n", directory.replace('\'', "'\\''")),
        ShellKind::Cmd => format!("cd /d \"{directory}\"\r\n"),
        ShellKind::PowerShell => format!("Set-Location -LiteralPath '{}'\n", directory.replace('\'', "''")),
    };
    line.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_shell_gets_login_flag() {
        let (shell, args) = shell_invocation("/bin/zsh");
        assert_eq!(shell, "/bin/zsh");
        assert_eq!(args, vec!["-l".to_string()]);
    }

    #[test]
    fn cmd_exe_gets_no_login_flag() {
        let (shell, args) = shell_invocation("cmd.exe");
        assert_eq!(shell, "cmd.exe");
        assert!(args.is_empty());
    }

    #[test]
    fn posix_cd_command_is_quoted() {
        let cmd = cd_command(ShellKind::Posix, "/tmp/a b");
        assert_eq!(cmd, b"cd -- '/tmp/a b'\n");
    }

    #[test]
    fn posix_cd_command_escapes_embedded_quote() {
        let cmd = cd_command(ShellKind::Posix, "it's");
        assert_eq!(cmd, b"cd -- 'it'\\''s'\n");
    }

    #[test]
    fn cmd_exe_cd_command_uses_cd_slash_d() {
        let cmd = cd_command(ShellKind::Cmd, r"C:\tmp");
        assert_eq!(cmd, b"cd /d \"C:\\tmp\"\r\n");
    }

    #[test]
    fn powershell_cd_command_uses_set_location() {
        let cmd = cd_command(ShellKind::PowerShell, "/tmp/a");
        assert_eq!(cmd, b"Set-Location -LiteralPath '/tmp/a'\n");
    }
}
