use serde::Serialize;

use crate::state::token::{Token, TokenId, format_grouped};
use crate::state::token_store::TokenStore;

const PLACEHOLDER: &str = "—";

/// Selected token and detail-view visibility. The two are independent:
/// closing the detail view keeps the selection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    selected: Option<TokenId>,
    detail_open: bool,
}

impl Selection {
    pub fn select(&mut self, id: Option<TokenId>) {
        self.selected = id;
    }

    pub fn open_detail(&mut self) {
        self.detail_open = true;
    }

    pub fn close_detail(&mut self) {
        self.detail_open = false;
    }

    pub fn toggle_detail(&mut self) {
        self.detail_open = !self.detail_open;
    }

    pub fn selected(&self) -> Option<&TokenId> {
        self.selected.as_ref()
    }

    pub fn is_detail_open(&self) -> bool {
        self.detail_open
    }

    /// Looks the selected id up in the store as it is now. Yields `None`
    /// when nothing is selected or the id is gone (e.g. after a reload).
    pub fn resolve<'a>(&self, store: &'a TokenStore) -> Option<&'a Token> {
        store.get(self.selected.as_ref()?.as_str())
    }
}

/// Render model for the detail view; every field has a placeholder so a
/// missing token still renders.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailView {
    pub open: bool,
    pub token_id: Option<TokenId>,
    pub avatar: String,
    pub title: String,
    pub description: String,
    pub price: String,
    pub change: String,
    pub change_up: bool,
    pub volume: String,
    pub liquidity: String,
    pub status: String,
    pub pair: String,
}

impl DetailView {
    pub fn render(token: Option<&Token>, open: bool) -> Self {
        let Some(token) = token else {
            return Self {
                open,
                token_id: None,
                avatar: PLACEHOLDER.to_string(),
                title: "Token details".to_string(),
                description: "No token selected".to_string(),
                price: PLACEHOLDER.to_string(),
                change: PLACEHOLDER.to_string(),
                change_up: false,
                volume: PLACEHOLDER.to_string(),
                liquidity: PLACEHOLDER.to_string(),
                status: PLACEHOLDER.to_string(),
                pair: PLACEHOLDER.to_string(),
            };
        };

        Self {
            open,
            token_id: Some(token.id.clone()),
            avatar: token.symbol.chars().take(2).collect(),
            title: format!("{} — {}", token.symbol, token.name),
            description: token.pair.clone(),
            price: format!("${:.6}", token.price),
            change: format!("{:.2}% (24h)", token.change24h),
            change_up: token.change24h >= 0.0,
            volume: format_grouped(token.volume24h),
            liquidity: format_grouped(token.liquidity),
            status: token.status.badge_label().to_string(),
            pair: token.pair.clone(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.token_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::token_store::tests::token;

    #[test]
    fn selection_and_visibility_are_independent() {
        let mut selection = Selection::default();
        selection.select(Some(TokenId::from("a")));
        assert!(!selection.is_detail_open());

        selection.open_detail();
        selection.close_detail();
        assert_eq!(selection.selected().map(TokenId::as_str), Some("a"));

        selection.select(None);
        selection.toggle_detail();
        assert!(selection.is_detail_open());
        assert!(selection.selected().is_none());
    }

    #[test]
    fn resolve_reads_through_to_the_current_snapshot() {
        let mut store = TokenStore::from_tokens(vec![token("a", 10.0)]);
        let mut selection = Selection::default();
        selection.select(Some(TokenId::from("a")));
        assert_eq!(selection.resolve(&store).unwrap().price, 10.0);

        store.replace_all(vec![token("b", 1.0)]);
        assert!(selection.resolve(&store).is_none());
    }

    #[test]
    fn detail_renders_token_or_placeholder() {
        let mut t = token("abc", 1.5);
        t.volume24h = 1_234_567;
        t.change24h = -2.5;
        let view = DetailView::render(Some(&t), true);
        assert_eq!(view.avatar, "AB");
        assert_eq!(view.title, "ABC — Token abc");
        assert_eq!(view.price, "$1.500000");
        assert_eq!(view.change, "-2.50% (24h)");
        assert!(!view.change_up);
        assert_eq!(view.volume, "1,234,567");
        assert_eq!(view.status, "New");

        let empty = DetailView::render(None, true);
        assert!(empty.is_placeholder());
        assert_eq!(empty.description, "No token selected");
        assert_eq!(empty.price, "—");
    }
}
