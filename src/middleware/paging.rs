use std::convert::Infallible;

use rocket::request::{FromRequest, Outcome, Request};

use crate::config::Config;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PageState {
    pub page_length: u32,
    pub page: u32,
}

impl Default for PageState {
    fn default() -> Self {
        PageState {
            page_length: 20,
            page: 0,
        }
    }
}

impl PageState {
    pub fn new(page: u32, page_length: u32) -> PageState {
        PageState {
            page_length: page_length.max(1),
            page,
        }
    }

    pub fn skip(&self) -> u64 {
        self.page as u64 * self.page_length as u64
    }

    /// Slice of `items` this page covers.
    pub fn window<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.skip() as usize)
            .take(self.page_length as usize)
            .collect()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PageState {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let (default_length, max_length) = request
            .rocket()
            .state::<Config>()
            .map(|c| (c.default_page_length, c.max_page_length))
            .unwrap_or((20, 100));

        let length: Option<u32> = request
            .query_value("len")
            .and_then(|it| it.ok())
            .or_else(|| request.query_value("l").and_then(|it| it.ok()));

        let page: Option<u32> = request
            .query_value("page")
            .and_then(|it| it.ok())
            .or_else(|| request.query_value("p").and_then(|it| it.ok()));

        Outcome::Success(PageState::new(
            page.unwrap_or(0),
            length.unwrap_or(default_length).min(max_length.max(1)),
        ))
    }
}
