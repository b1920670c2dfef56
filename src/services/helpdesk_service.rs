use secrecy::SecretString;

use crate::{
    config::{Config, MAX_SEARCH_PAGE_SIZE},
    error::AppResult,
    models::{
        Contact, ContactLocation, ConversationDetail, SearchPagination, SearchQuery,
        SearchRequest, SearchResponse, TimeWindow,
    },
    services::{ApiClient, ApiResponse},
};

/// Header carrying the helpdesk API version
pub const API_VERSION_HEADER: &str = "Intercom-Version";

/// Typed access to the helpdesk endpoints the pipeline uses
#[derive(Clone)]
pub struct HelpdeskService {
    client: ApiClient,
    page_size: u32,
}

impl HelpdeskService {
    pub fn new(client: ApiClient, page_size: u32) -> Self {
        Self {
            client,
            page_size: page_size.clamp(1, MAX_SEARCH_PAGE_SIZE),
        }
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        let token = config.require_helpdesk_token()?;
        let client = ApiClient::new(
            &config.helpdesk_base_url,
            SecretString::from(token.to_string()),
            config.request_timeout(),
        )?
        .with_header(API_VERSION_HEADER, config.helpdesk_api_version.clone());

        Ok(Self::new(client, config.effective_page_size()))
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Search body for conversations created inside `window`.
    ///
    /// The API only offers strict `>`/`<`, so the bounds are widened by one
    /// second each way to stay inclusive.
    pub fn build_search_request(
        window: &TimeWindow,
        page_size: u32,
        cursor: Option<&str>,
    ) -> SearchRequest {
        SearchRequest {
            query: SearchQuery::Compound {
                operator: "AND".to_string(),
                value: vec![
                    SearchQuery::Field {
                        field: "created_at".to_string(),
                        operator: ">".to_string(),
                        value: window.start.timestamp() - 1,
                    },
                    SearchQuery::Field {
                        field: "created_at".to_string(),
                        operator: "<".to_string(),
                        value: window.end.timestamp() + 1,
                    },
                ],
            },
            pagination: SearchPagination {
                per_page: page_size.clamp(1, MAX_SEARCH_PAGE_SIZE),
                starting_after: cursor.map(str::to_string),
            },
        }
    }

    pub async fn search_conversations(
        &self,
        window: &TimeWindow,
        cursor: Option<&str>,
    ) -> ApiResponse<SearchResponse> {
        let request = Self::build_search_request(window, self.page_size, cursor);
        self.client.post_json("conversations/search", &request).await
    }

    pub async fn get_conversation(&self, id: &str) -> ApiResponse<ConversationDetail> {
        self.client.get_json(&format!("conversations/{id}")).await
    }

    pub async fn get_contact(&self, id: &str) -> ApiResponse<Contact> {
        self.client.get_json(&format!("contacts/{id}")).await
    }

    /// Country/region of a contact; empty strings count as absent.
    pub async fn get_contact_location(&self, id: &str) -> ApiResponse<ContactLocation> {
        self.get_contact(id).await.map(|contact| {
            let location = contact.location.unwrap_or_default();
            let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
            ContactLocation {
                country: non_empty(location.country),
                region: non_empty(location.region),
            }
        })
    }
}
