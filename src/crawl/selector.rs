//! セレクタ候補の解決
//!
//! 候補を先頭から順に試し、最初に要素が見つかったものを採用する。
//! 後ろの候補も一致する場合でも先頭側が優先される。見つからないことは
//! 想定内の結果であり、エラーにはしない。

use std::fmt;

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::traits::{BrowserSession, PageElement};

/// テキスト一致の方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    /// 大文字小文字を無視した部分一致
    Contains,
    /// 前後の空白を除いた完全一致
    Exact,
    /// 前後の矢印記号を除き、大文字小文字を無視した完全一致 (`Next »` など)
    Label,
}

/// ボタン文字列の前後に付く装飾
const LABEL_DECORATION: &[char] = &['»', '«', '›', '‹', '>', '<', '→', '←'];

/// セレクタ候補
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Css(String),
    /// `scope` に一致する要素のうち表示テキストが `text` に一致するもの
    Text {
        scope: String,
        text: String,
        mode: TextMode,
    },
    /// 入れ子の候補を順に試す
    Any(Vec<Selector>),
}

impl Selector {
    pub fn css(selector: impl Into<String>) -> Self {
        Selector::Css(selector.into())
    }

    pub fn text(scope: impl Into<String>, text: impl Into<String>) -> Self {
        Selector::Text {
            scope: scope.into(),
            text: text.into(),
            mode: TextMode::Contains,
        }
    }

    pub fn exact_text(scope: impl Into<String>, text: impl Into<String>) -> Self {
        Selector::Text {
            scope: scope.into(),
            text: text.into(),
            mode: TextMode::Exact,
        }
    }

    pub fn label(scope: impl Into<String>, text: impl Into<String>) -> Self {
        Selector::Text {
            scope: scope.into(),
            text: text.into(),
            mode: TextMode::Label,
        }
    }

    pub fn any(candidates: impl Into<Vec<Selector>>) -> Self {
        Selector::Any(candidates.into())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(css) => write!(f, "{}", css),
            Selector::Text { scope, text, mode } => match mode {
                TextMode::Contains => write!(f, "{}:has-text(\"{}\")", scope, text),
                TextMode::Exact => write!(f, "{}:text-is(\"{}\")", scope, text),
                TextMode::Label => write!(f, "{}:label(\"{}\")", scope, text),
            },
            Selector::Any(list) => {
                let parts: Vec<String> = list.iter().map(|s| s.to_string()).collect();
                write!(f, "any({})", parts.join(" | "))
            }
        }
    }
}

/// 解決結果
#[derive(Debug, Clone)]
pub enum SelectorResult<E> {
    Found {
        element: E,
        /// 実際に一致した候補
        selector: Selector,
    },
    NotFound,
}

impl<E> SelectorResult<E> {
    pub fn is_found(&self) -> bool {
        matches!(self, SelectorResult::Found { .. })
    }

    pub fn into_element(self) -> Option<E> {
        match self {
            SelectorResult::Found { element, .. } => Some(element),
            SelectorResult::NotFound => None,
        }
    }
}

/// 候補を順に試して最初に見つかった要素を返す
pub async fn resolve<S: BrowserSession>(
    session: &S,
    candidates: &[Selector],
) -> SelectorResult<S::Element> {
    for candidate in candidates {
        if let Some((element, selector)) = query_first(session, candidate).await {
            debug!("Selector matched: {}", selector);
            return SelectorResult::Found { element, selector };
        }
    }
    debug!("No selector matched among {} candidates", candidates.len());
    SelectorResult::NotFound
}

fn query_first<'a, S: BrowserSession>(
    session: &'a S,
    selector: &'a Selector,
) -> BoxFuture<'a, Option<(S::Element, Selector)>> {
    async move {
        match selector {
            Selector::Css(css) => match session.query_selector_all(css).await {
                Ok(elements) => elements.into_iter().next().map(|e| (e, selector.clone())),
                Err(e) => {
                    debug!("Query failed for {}: {}", css, e);
                    None
                }
            },
            Selector::Text { scope, text, mode } => {
                let elements = match session.query_selector_all(scope).await {
                    Ok(elements) => elements,
                    Err(e) => {
                        debug!("Query failed for {}: {}", scope, e);
                        return None;
                    }
                };
                for element in elements {
                    let Ok(inner) = element.inner_text().await else {
                        continue;
                    };
                    if text_matches(&inner, text, *mode) {
                        return Some((element, selector.clone()));
                    }
                }
                None
            }
            Selector::Any(list) => {
                for nested in list {
                    if let Some(found) = query_first(session, nested).await {
                        return Some(found);
                    }
                }
                None
            }
        }
    }
    .boxed()
}

pub(crate) fn text_matches(haystack: &str, needle: &str, mode: TextMode) -> bool {
    match mode {
        TextMode::Contains => haystack.to_lowercase().contains(&needle.to_lowercase()),
        TextMode::Exact => haystack.trim() == needle.trim(),
        TextMode::Label => {
            strip_decoration(haystack).to_lowercase() == strip_decoration(needle).to_lowercase()
        }
    }
}

fn strip_decoration(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || LABEL_DECORATION.contains(&c))
}
