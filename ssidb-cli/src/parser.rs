use ssidb_core::{Command, SiteId, VarId};

const OP_BEGIN: &str = "begin";
const OP_READ: &str = "R";
const OP_WRITE: &str = "W";
const OP_DUMP: &str = "dump";
const OP_END: &str = "end";
const OP_FAIL: &str = "fail";
const OP_RECOVER: &str = "recover";

/// Splits one raw input line into zero or more commands. Lines may pack
/// several instructions separated by `;`, and `//`-prefixed pieces are
/// comments.
pub fn parse_line(line: &str) -> Vec<Command> {
    line.split(';')
        .map(str::trim)
        .filter(|piece| !piece.is_empty() && !piece.starts_with("//"))
        .filter_map(parse_instruction)
        .collect()
}

fn parse_instruction(raw: &str) -> Option<Command> {
    let op = raw.split('(').next().unwrap_or("").trim();
    let params = extract_params(raw);

    match op {
        OP_BEGIN => params.first().map(|name| Command::Begin {
            name: name.to_string(),
        }),
        OP_READ => {
            let name = params.first()?.to_string();
            let var = VarId::parse(params.get(1)?)?;
            Some(Command::Read { name, var })
        }
        OP_WRITE => {
            let name = params.first()?.to_string();
            let var = VarId::parse(params.get(1)?)?;
            let value: i64 = params.get(2)?.parse().ok()?;
            Some(Command::Write { name, var, value })
        }
        OP_END => params.first().map(|name| Command::End {
            name: name.to_string(),
        }),
        OP_FAIL => {
            let id: u8 = params.first()?.parse().ok()?;
            Some(Command::Fail { site: SiteId(id) })
        }
        OP_RECOVER => {
            let id: u8 = params.first()?.parse().ok()?;
            Some(Command::Recover { site: SiteId(id) })
        }
        OP_DUMP => Some(parse_dump(&params)),
        other => {
            tracing::warn!("skipping unrecognized instruction: {other}({raw})");
            None
        }
    }
}

fn parse_dump(params: &[String]) -> Command {
    match params.first().map(String::as_str) {
        None | Some("") => Command::Dump,
        Some(arg) => {
            if let Some(var) = VarId::parse(arg) {
                Command::DumpVariable { var }
            } else if let Ok(id) = arg.parse::<u8>() {
                Command::DumpSite { site: SiteId(id) }
            } else {
                Command::Dump
            }
        }
    }
}

fn extract_params(raw: &str) -> Vec<String> {
    let Some(open) = raw.find('(') else {
        return Vec::new();
    };
    let Some(close) = raw.rfind(')') else {
        return Vec::new();
    };
    if close <= open {
        return Vec::new();
    }
    raw[open + 1..close]
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_begin_read_write_end() {
        let cmds = parse_line("begin(T1); R(T1, x1); W(T1, x2, 7); end(T1)");
        assert_eq!(
            cmds,
            vec![
                Command::Begin { name: "T1".into() },
                Command::Read {
                    name: "T1".into(),
                    var: VarId(1)
                },
                Command::Write {
                    name: "T1".into(),
                    var: VarId(2),
                    value: 7
                },
                Command::End { name: "T1".into() },
            ]
        );
    }

    #[test]
    fn skips_comments_and_blank_pieces() {
        let cmds = parse_line("  // a whole comment line  ");
        assert!(cmds.is_empty());

        let cmds = parse_line("fail(3);; recover(3)");
        assert_eq!(
            cmds,
            vec![
                Command::Fail { site: SiteId(3) },
                Command::Recover { site: SiteId(3) },
            ]
        );
    }

    #[test]
    fn dump_distinguishes_site_and_variable_arguments() {
        assert_eq!(parse_line("dump()"), vec![Command::Dump]);
        assert_eq!(
            parse_line("dump(x5)"),
            vec![Command::DumpVariable { var: VarId(5) }]
        );
        assert_eq!(
            parse_line("dump(7)"),
            vec![Command::DumpSite { site: SiteId(7) }]
        );
    }

    #[test]
    fn unrecognized_instruction_is_skipped_not_fatal() {
        assert!(parse_line("quux(T1)").is_empty());
    }
}
