//! REPL command grammar.

use crate::export::ExportFormat;
use crate::remote::SortDirection;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Show,
    Page(u64),
    Next,
    Prev,
    Size(u64),
    Sort { column: String, direction: SortDirection },
    Unsort,
    Open(String),
    Refresh,
    Edit { row: usize, column: String, value: String },
    Null { row: usize, column: String },
    Choices(String),
    Select(usize),
    SelectAll,
    Delete,
    Save,
    Discard,
    Insert,
    Set { column: String, value: String },
    Commit,
    Cancel,
    Export { format: ExportFormat, path: Option<String> },
    ExportAll { format: ExportFormat, path: Option<String> },
    TabNew(String),
    TabList,
    TabUse(usize),
    TabClose,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  show | <enter>               redraw the current page
  page <n> | next | prev       move between pages
  size <n>                     rows per page
  sort <col> [asc|desc]        sort by a column; `sort off` to clear
  open <[schema.]table>        browse another relation in this tab
  refresh                      refetch the page, keeping pending edits
  edit <row> <col> <value>     edit a cell (\"\" for blank)
  null <row> <col>             set a cell to NULL
  choices <col>                allowed values of a boolean/enum column
  select <row> | select all    toggle row selection
  delete                       delete selected rows
  save | discard               write or drop pending edits
  insert                       start a new row
  set <col> <value>            set a value in the new row
  commit | cancel              insert or abandon the new row
  export csv|json [path]       export the page as displayed
  export all csv|json [path]   export every row of the table as stored
  tab new <table> | tab list | tab use <n> | tab close
  status | help | quit";

/// Strip one pair of surrounding double quotes, so `\"\"` is a blank value.
fn unquote(s: &str) -> String {
    let t = s.trim();
    if t.len() >= 2 && t.starts_with('"') && t.ends_with('"') {
        return t[1..t.len() - 1].to_string();
    }
    t.to_string()
}

fn number<T: std::str::FromStr>(s: Option<&str>, what: &str) -> Result<T, String> {
    let s = s.ok_or_else(|| format!("missing {}", what))?;
    s.parse::<T>().map_err(|_| format!("'{}' is not a valid {}", s, what))
}

fn word<'a>(s: Option<&'a str>, what: &str) -> Result<&'a str, String> {
    s.filter(|w| !w.is_empty()).ok_or_else(|| format!("missing {}", what))
}

/// Split off the first `n` whitespace-separated words; the remainder is returned verbatim.
fn split_words(line: &str, n: usize) -> (Vec<&str>, &str) {
    let mut words = Vec::with_capacity(n);
    let mut rest = line.trim_start();
    for _ in 0..n {
        if rest.is_empty() { break; }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        words.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    (words, rest)
}

pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Show);
    }
    let (head, rest) = split_words(line, 1);
    let verb = head.first().map(|s| s.to_ascii_lowercase()).unwrap_or_default();
    let mut args = rest.split_whitespace();
    match verb.as_str() {
        "show" | "ls" => Ok(Command::Show),
        "page" => Ok(Command::Page(number(args.next(), "page number")?)),
        "next" | "n" => Ok(Command::Next),
        "prev" | "p" => Ok(Command::Prev),
        "size" => Ok(Command::Size(number(args.next(), "page size")?)),
        "sort" => {
            let column = word(args.next(), "column")?;
            if column.eq_ignore_ascii_case("off") {
                return Ok(Command::Unsort);
            }
            let direction = match args.next() {
                None => SortDirection::Asc,
                Some(d) => SortDirection::parse(d).ok_or_else(|| format!("sort direction must be asc or desc, not '{}'", d))?,
            };
            Ok(Command::Sort { column: column.to_string(), direction })
        }
        "open" => Ok(Command::Open(word(args.next(), "relation")?.to_string())),
        "refresh" | "r" => Ok(Command::Refresh),
        "edit" | "e" => {
            let (w, value) = split_words(rest, 2);
            let row = number(w.first().copied(), "row index")?;
            let column = word(w.get(1).copied(), "column")?.to_string();
            Ok(Command::Edit { row, column, value: unquote(value) })
        }
        "null" => {
            let row = number(args.next(), "row index")?;
            let column = word(args.next(), "column")?.to_string();
            Ok(Command::Null { row, column })
        }
        "choices" => Ok(Command::Choices(word(args.next(), "column")?.to_string())),
        "select" | "sel" => match args.next() {
            Some(a) if a.eq_ignore_ascii_case("all") => Ok(Command::SelectAll),
            other => Ok(Command::Select(number(other, "row index")?)),
        },
        "delete" | "del" => Ok(Command::Delete),
        "save" => Ok(Command::Save),
        "discard" => Ok(Command::Discard),
        "insert" | "new" => Ok(Command::Insert),
        "set" => {
            let (w, value) = split_words(rest, 1);
            let column = word(w.first().copied(), "column")?.to_string();
            Ok(Command::Set { column, value: unquote(value) })
        }
        "commit" => Ok(Command::Commit),
        "cancel" => Ok(Command::Cancel),
        "export" => {
            let mut f = word(args.next(), "format")?;
            let all = f.eq_ignore_ascii_case("all");
            if all {
                f = word(args.next(), "format")?;
            }
            let format = ExportFormat::parse(f).ok_or_else(|| format!("unknown export format '{}'", f))?;
            let path = args.next().map(|p| p.to_string());
            Ok(if all { Command::ExportAll { format, path } } else { Command::Export { format, path } })
        }
        "tab" => match args.next().map(|s| s.to_ascii_lowercase()).as_deref() {
            Some("new") => Ok(Command::TabNew(word(args.next(), "relation")?.to_string())),
            Some("list") | None => Ok(Command::TabList),
            Some("use") => Ok(Command::TabUse(number(args.next(), "tab number")?)),
            Some("close") => Ok(Command::TabClose),
            Some(other) => Err(format!("unknown tab command '{}'", other)),
        },
        "status" => Ok(Command::Status),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(format!("unknown command '{}'; type 'help'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_keeps_spaces_and_unquotes() {
        assert_eq!(
            parse("edit 3 name  Mary Jane ").unwrap(),
            Command::Edit { row: 3, column: "name".into(), value: "Mary Jane".into() }
        );
        assert_eq!(parse("e 0 note \"\"").unwrap(), Command::Edit { row: 0, column: "note".into(), value: String::new() });
        assert_eq!(parse("set note \" padded \"").unwrap(), Command::Set { column: "note".into(), value: " padded ".into() });
    }

    #[test]
    fn navigation_and_sorting() {
        assert_eq!(parse("").unwrap(), Command::Show);
        assert_eq!(parse("PAGE 4").unwrap(), Command::Page(4));
        assert_eq!(parse("sort name desc").unwrap(), Command::Sort { column: "name".into(), direction: SortDirection::Desc });
        assert_eq!(parse("sort off").unwrap(), Command::Unsort);
        assert!(parse("sort name sideways").is_err());
        assert!(parse("page two").unwrap_err().contains("not a valid page number"));
    }

    #[test]
    fn selection_export_and_tabs() {
        assert_eq!(parse("select all").unwrap(), Command::SelectAll);
        assert_eq!(parse("sel 2").unwrap(), Command::Select(2));
        assert_eq!(parse("export json out.json").unwrap(), Command::Export { format: ExportFormat::Json, path: Some("out.json".into()) });
        assert_eq!(parse("export all csv").unwrap(), Command::ExportAll { format: ExportFormat::Csv, path: None });
        assert_eq!(parse("export ALL json t.json").unwrap(), Command::ExportAll { format: ExportFormat::Json, path: Some("t.json".into()) });
        assert!(parse("export all").is_err());
        assert_eq!(parse("tab use 1").unwrap(), Command::TabUse(1));
        assert_eq!(parse("tab").unwrap(), Command::TabList);
        assert!(parse("frobnicate").is_err());
    }
}
