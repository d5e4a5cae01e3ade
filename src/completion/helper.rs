//! rustyline glue: the external line editor (SPEC_FULL §1) owns the render
//! loop, this crate only supplies the `Completer`/`Hinter`/`Highlighter`
//! trait methods (SPEC_FULL §4.5 Ambient).

use std::borrow::Cow;
use std::sync::Arc;

use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

use crate::context::ContextProvider;
use crate::predict::Predictor;

use super::CompletionEngine;

/// Bridges the async [`CompletionEngine`] and [`Predictor`] to rustyline's
/// synchronous `Helper` traits. Readline runs on a blocking thread (outside
/// the async worker pool), so `Handle::block_on` here never contends with
/// the `block_in_place` restriction a current-thread runtime would hit.
pub struct BishHelper {
    pub engine: Arc<CompletionEngine>,
    pub predictor: Option<Arc<Predictor>>,
    pub context: Option<Arc<ContextProvider>>,
    pub runtime: tokio::runtime::Handle,
}

impl Completer for BishHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let candidates = self.runtime.block_on(self.engine.complete(line, pos));
        let start = line[..pos.min(line.len())]
            .rfind(char::is_whitespace)
            .map(|i| i + 1)
            .unwrap_or(0);
        let pairs = candidates
            .into_iter()
            .map(|c| Pair {
                display: c.clone(),
                replacement: c,
            })
            .collect();
        Ok((start, pairs))
    }
}

impl Hinter for BishHelper {
    type Hint = String;

    /// Delegates to [`Predictor::suggest`] (SPEC_FULL §4.6). Only hints at
    /// end-of-line, matching how inline suggestions are normally rendered;
    /// returns the suffix beyond what's already typed.
    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        if pos != line.len() {
            return None;
        }
        let predictor = self.predictor.as_ref()?;
        let context_provider = self.context.as_ref()?;
        let line = line.to_string();
        let suggestion = self.runtime.block_on(async {
            let bundle = context_provider.get_context().await;
            predictor.suggest(&line, &bundle).await
        });
        suggestion.strip_prefix(line.as_str()).map(str::to_string).filter(|s| !s.is_empty())
    }
}

impl Highlighter for BishHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[2m{hint}\x1b[0m"))
    }
}

impl Validator for BishHelper {}

impl Helper for BishHelper {}
