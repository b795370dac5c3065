//! 管理控制台命令

use std::time::SystemTime;

use crate::plugin::{ScriptManager, ScriptingError, Value};

pub const HELP: &str = "\
commands:
  list                          list loaded scripts
  enable <name>                 enable and load a script
  disable <name>                deactivate and disable a script
  restart <name>                disable then enable a script
  call <name> <fn> [args...]    call a script function (args are JSON scalars)
  help                          show this help
  quit                          deactivate all scripts and exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List,
    Enable(String),
    Disable(String),
    Restart(String),
    Call {
        script: String,
        function: String,
        args: Vec<Value>,
    },
    Help,
    Quit,
}

/// 解析一行输入；空行返回 `Ok(None)`
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let words = split_words(line)?;
    let Some((head, rest)) = words.split_first() else {
        return Ok(None);
    };

    let one_name = |cmd: &str| -> Result<String, String> {
        match rest {
            [name] => Ok(name.clone()),
            _ => Err(format!("usage: {} <name>", cmd)),
        }
    };

    let command = match head.as_str() {
        "list" | "ls" => Command::List,
        "enable" => Command::Enable(one_name("enable")?),
        "disable" => Command::Disable(one_name("disable")?),
        "restart" => Command::Restart(one_name("restart")?),
        "call" => {
            let [script, function, args @ ..] = rest else {
                return Err("usage: call <name> <fn> [args...]".into());
            };
            Command::Call {
                script: script.clone(),
                function: function.clone(),
                args: args.iter().map(|a| parse_arg(a)).collect::<Result<_, _>>()?,
            }
        }
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    Ok(Some(command))
}

/// 按空白切分；双引号内的空白保留，引号本身保留给 JSON 解析
fn split_words(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in line.chars() {
        if in_quotes {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                current.push(c);
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if in_quotes {
        return Err("unterminated quote".into());
    }
    if !current.is_empty() {
        words.push(current);
    }
    Ok(words)
}

/// JSON 标量转为脚本值；无法解析为 JSON 的裸词作为字符串
fn parse_arg(word: &str) -> Result<Value, String> {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(word) else {
        return Ok(Value::Str(word.to_string()));
    };
    match json {
        serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Int(i)),
            None => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| format!("number out of range: {}", word)),
        },
        serde_json::Value::String(s) => Ok(Value::Str(s)),
        _ => Err(format!("unsupported argument '{}': only scalars are allowed", word)),
    }
}

/// 执行命令，返回给用户的输出文本
///
/// 阻塞调用；在异步上下文中应放入 `spawn_blocking`。
pub fn execute(manager: &ScriptManager, command: Command) -> Result<String, ScriptingError> {
    match command {
        Command::List => {
            let now = SystemTime::now();
            let mut lines = Vec::new();
            manager.for_each(|script| {
                let age = now
                    .duration_since(script.loaded_at)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                let caps = script.instance.capabilities();
                lines.push(format!(
                    "{}  ({} callables, {} entrypoints, {} destructors, loaded {}s ago)",
                    script.name,
                    caps.callables.len(),
                    caps.activation_hooks.len(),
                    caps.deactivation_hooks.len(),
                    age
                ));
            });
            if lines.is_empty() {
                Ok("no scripts loaded".into())
            } else {
                Ok(lines.join("\n"))
            }
        }
        Command::Enable(name) => {
            manager.enable(&name)?;
            Ok(format!("{} enabled", name))
        }
        Command::Disable(name) => {
            manager.disable(&name)?;
            Ok(format!("{} disabled", name))
        }
        Command::Restart(name) => {
            manager.restart(&name)?;
            Ok(format!("{} restarted", name))
        }
        Command::Call {
            script,
            function,
            args,
        } => {
            let result = manager.invoke(&script, &function, args)?;
            Ok(match result {
                Value::Unit => "ok".to_string(),
                Value::Str(s) => format!("{:?}", s),
                other => other.to_string(),
            })
        }
        Command::Help => Ok(HELP.to_string()),
        Command::Quit => Ok("bye".to_string()),
    }
}
