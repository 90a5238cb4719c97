use std::str::FromStr;

use anyhow::{Context, anyhow, bail};

use crate::state::token::TokenId;
use crate::view::projection::{Filter, SortKey, SortSpec};

/// User actions; the only way sort, filter, viewport and selection change.
#[derive(Debug, Clone, PartialEq)]
pub enum TableIntent {
    /// Column-header click.
    ToggleSort(SortKey),
    SetSort(SortSpec),
    ClearSort,
    ToggleDirection,
    SetFilter(Filter),
    /// Absolute scroll offset in pixels.
    Scroll(f64),
    /// New viewport height in pixels.
    Resize(f64),
    ScrollToIndex(usize),
    /// Row click: select the token, then open its detail view.
    ActivateRow(TokenId),
    /// Row click addressed by position in the current projection.
    ActivateIndex(usize),
    Select(Option<TokenId>),
    OpenDetail,
    CloseDetail,
    ToggleDetail,
    /// Close the detail view, then clear the selection.
    Dismiss,
    Retry,
}

impl FromStr for TableIntent {
    type Err = anyhow::Error;

    /// Parses the text command syntax, e.g. `sort price`, `filter new`,
    /// `scroll 640`, `open 3`.
    fn from_str(line: &str) -> anyhow::Result<Self> {
        let mut words = line.split_whitespace();
        let command = words.next().ok_or_else(|| anyhow!("empty command"))?;
        let arg = words.next();

        let intent = match command {
            "sort" => TableIntent::ToggleSort(parse_sort_key(arg)?),
            "dir" => TableIntent::ToggleDirection,
            "clear-sort" => TableIntent::ClearSort,
            "filter" => {
                let tab = required(arg, "filter")?;
                TableIntent::SetFilter(
                    Filter::parse(tab).ok_or_else(|| anyhow!("unknown filter tab {tab:?}"))?,
                )
            }
            "scroll" => TableIntent::Scroll(parse_number(arg, "scroll")?),
            "resize" => TableIntent::Resize(parse_number(arg, "resize")?),
            "goto" => TableIntent::ScrollToIndex(parse_number(arg, "goto")?),
            "open" => TableIntent::ActivateIndex(parse_number(arg, "open")?),
            "select" => TableIntent::Select(Some(TokenId::from(required(arg, "select")?))),
            "deselect" => TableIntent::Select(None),
            "show" => TableIntent::OpenDetail,
            "hide" => TableIntent::CloseDetail,
            "toggle" => TableIntent::ToggleDetail,
            "close" => TableIntent::Dismiss,
            "retry" => TableIntent::Retry,
            other => bail!("unknown command {other:?}"),
        };

        if let Some(extra) = words.next() {
            bail!("unexpected argument {extra:?} for {command:?}");
        }
        Ok(intent)
    }
}

fn required<'a>(arg: Option<&'a str>, command: &str) -> anyhow::Result<&'a str> {
    arg.ok_or_else(|| anyhow!("{command} needs an argument"))
}

fn parse_sort_key(arg: Option<&str>) -> anyhow::Result<SortKey> {
    let key = required(arg, "sort")?;
    SortKey::parse(key).ok_or_else(|| anyhow!("unknown sort column {key:?}"))
}

fn parse_number<T>(arg: Option<&str>, command: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = required(arg, command)?;
    raw.parse()
        .with_context(|| format!("{command} expects a number, got {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::token::TokenStatus;

    #[test]
    fn parses_commands() {
        assert_eq!("sort volume".parse::<TableIntent>().unwrap(), TableIntent::ToggleSort(SortKey::Volume24h));
        assert_eq!(
            "filter final-stretch".parse::<TableIntent>().unwrap(),
            TableIntent::SetFilter(Filter::Status(TokenStatus::FinalStretch))
        );
        assert_eq!("scroll 640".parse::<TableIntent>().unwrap(), TableIntent::Scroll(640.0));
        assert_eq!("open 3".parse::<TableIntent>().unwrap(), TableIntent::ActivateIndex(3));
        assert_eq!(
            "select abc".parse::<TableIntent>().unwrap(),
            TableIntent::Select(Some(TokenId::from("abc")))
        );
        assert_eq!("  close ".parse::<TableIntent>().unwrap(), TableIntent::Dismiss);
    }

    #[test]
    fn rejects_bad_commands() {
        assert!("".parse::<TableIntent>().is_err());
        assert!("sort".parse::<TableIntent>().is_err());
        assert!("sort name".parse::<TableIntent>().is_err());
        assert!("open -1".parse::<TableIntent>().is_err());
        assert!("filter old".parse::<TableIntent>().is_err());
        assert!("retry now".parse::<TableIntent>().is_err());
        assert!("jump".parse::<TableIntent>().is_err());
    }
}
