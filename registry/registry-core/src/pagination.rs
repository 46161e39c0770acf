// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Cursor based listings.

use std::collections::VecDeque;

use futures::{Stream, StreamExt, stream::BoxStream};

use crate::error::RegistryError;

/// Number of documents fetched from the store per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// An item of a listing together with the cursor resuming after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listed<T> {
    /// The item.
    pub item: T,
    /// Opaque cursor. Passing it back as `after` resumes after `item`.
    pub cursor: String,
}

/// Stream of listed items.
pub type ListingStream<T> = BoxStream<'static, Result<Listed<T>, RegistryError>>;

/// Encodes a store key into an opaque cursor.
pub fn encode_cursor(key: &str) -> String {
    hex::encode(key)
}

/// Decodes a cursor produced by [encode_cursor].
pub fn decode_cursor(cursor: &str) -> Result<String, RegistryError> {
    let invalid = || RegistryError::InvalidArgument(format!("malformed cursor {cursor:?}"));
    let bytes = hex::decode(cursor).map_err(|_| invalid())?;
    String::from_utf8(bytes).map_err(|_| invalid())
}

struct PageState<T, F, K> {
    after: Option<String>,
    buffer: VecDeque<(String, T)>,
    exhausted: bool,
    fetch: F,
    keep: K,
    page_size: usize,
}

/// Lazily pages through keyed items.
///
/// `fetch(after, limit)` returns up to `limit` items with keys strictly
/// greater than `after`, ordered by key. A shorter page ends the listing.
/// Items rejected by `keep` are skipped but still advance the cursor.
/// Nothing is held between pages, so the underlying data may change while
/// the listing is consumed.
pub fn paginate<T, F, Fut, K>(
    after: Option<String>,
    page_size: usize,
    fetch: F,
    keep: K,
) -> ListingStream<T>
where
    T: Send + 'static,
    F: FnMut(Option<String>, usize) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<(String, T)>, RegistryError>> + Send + 'static,
    K: Fn(&T) -> bool + Send + Sync + 'static,
{
    let state = PageState {
        after,
        buffer: VecDeque::new(),
        exhausted: false,
        fetch,
        keep,
        page_size: page_size.max(1),
    };
    futures::stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some((key, item)) = state.buffer.pop_front() {
                let listed = Listed {
                    item,
                    cursor: encode_cursor(&key),
                };
                return Ok(Some((listed, state)));
            }
            if state.exhausted {
                return Ok(None);
            }
            let page = (state.fetch)(state.after.clone(), state.page_size).await?;
            state.exhausted = page.len() < state.page_size;
            if let Some((key, _)) = page.last() {
                state.after = Some(key.clone());
            }
            let keep = &state.keep;
            state
                .buffer
                .extend(page.into_iter().filter(|(_, item)| keep(item)));
        }
    })
    .boxed()
}

/// Collects a listing into a vector.
pub async fn collect<T>(
    stream: impl Stream<Item = Result<Listed<T>, RegistryError>>,
) -> Result<Vec<T>, RegistryError> {
    let mut out = Vec::new();
    let mut stream = std::pin::pin!(stream);
    while let Some(listed) = stream.next().await {
        out.push(listed?.item);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use futures::TryStreamExt;

    use super::*;

    fn source(n: u32) -> Vec<(String, u32)> {
        (0..n).map(|i| (format!("{i:04}"), i)).collect()
    }

    fn fetch_from(
        items: Vec<(String, u32)>,
        calls: Arc<AtomicUsize>,
    ) -> impl FnMut(
        Option<String>,
        usize,
    ) -> futures::future::Ready<Result<Vec<(String, u32)>, RegistryError>>
    + Send
    + 'static {
        move |after, limit| {
            calls.fetch_add(1, Ordering::Relaxed);
            let page = items
                .iter()
                .filter(|(k, _)| after.as_ref().is_none_or(|a| k > a))
                .take(limit)
                .cloned()
                .collect();
            futures::future::ready(Ok(page))
        }
    }

    #[tokio::test]
    async fn pages_lazily_and_filters() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stream = paginate(None, 3, fetch_from(source(10), calls.clone()), |v| v % 2 == 0);
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        let items: Vec<_> = stream.map_ok(|l| l.item).try_collect().await.unwrap();
        assert_eq!(items, [0, 2, 4, 6, 8]);
        // Pages of 3, 3, 3 and 1.
        assert_eq!(calls.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn resumes_from_cursor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut stream = paginate(None, 4, fetch_from(source(7), calls.clone()), |_| true);
        let _first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        drop(stream);

        let after = decode_cursor(&second.cursor).unwrap();
        let rest: Vec<_> = paginate(Some(after), 4, fetch_from(source(7), calls), |_| true)
            .map_ok(|l| l.item)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rest, [2, 3, 4, 5, 6]);
    }

    #[test]
    fn malformed_cursor_is_rejected() {
        assert!(matches!(
            decode_cursor("zz"),
            Err(RegistryError::InvalidArgument(_))
        ));
        assert!(matches!(
            decode_cursor("ff"),
            Err(RegistryError::InvalidArgument(_))
        ));
        assert_eq!(decode_cursor(&encode_cursor("abc")).unwrap(), "abc");
    }
}
