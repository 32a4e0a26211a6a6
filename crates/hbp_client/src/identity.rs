//! Identity service store: users and groups.

use crate::config::ClientConfig;
use crate::dedup::InFlight;
use crate::model::{CurrentUser, Group, User};
use hbp_paging::{
    fetch_json, HbpError, HbpResult, HttpClient, HttpRequest, ResultSet, ResultSetOptions,
};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Maximum length of a batched `?filter=id=` URL.
pub const MAX_URL_LENGTH: usize = 2000;

/// Separator between batched ids, an encoded `+`.
const ID_SEPARATOR: &str = "%2B";

#[derive(Debug, Deserialize)]
struct ListEnvelope<T> {
    #[serde(default = "Vec::new")]
    result: Vec<T>,
}

/// Filtering, sorting and paging of identity listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityQuery {
    /// Page to load.
    pub page: u32,
    /// Items per page.
    pub page_size: u32,
    /// Filters; several values for one key match any of them.
    pub filter: Vec<(String, Vec<String>)>,
    /// Sort properties, `-` prefixed for descending order.
    pub sort: Vec<String>,
}

impl IdentityQuery {
    /// Creates a query for the first page of 10 items.
    pub fn new() -> Self {
        Self {
            page: 0,
            page_size: 10,
            filter: Vec::new(),
            sort: Vec::new(),
        }
    }

    /// Sets the page.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Adds a filter.
    pub fn with_filter<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter
            .push((key.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    /// Adds a sort property.
    pub fn with_sort(mut self, property: impl Into<String>) -> Self {
        self.sort.push(property.into());
        self
    }

    /// Query parameters: `page`, `pageSize`, `filter=k=v1+v2,k2=v`, `sort=a,b`.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("page".to_string(), self.page.to_string()),
            ("pageSize".to_string(), self.page_size.to_string()),
        ];
        if !self.filter.is_empty() {
            let filter = self
                .filter
                .iter()
                .map(|(key, values)| format!("{key}={}", values.join("+")))
                .collect::<Vec<_>>()
                .join(",");
            params.push(("filter".to_string(), filter));
        }
        if !self.sort.is_empty() {
            params.push(("sort".to_string(), self.sort.join(",")));
        }
        params
    }

    fn apply(&self, mut request: HttpRequest) -> HttpRequest {
        request.query.extend(self.params());
        request
    }
}

impl Default for IdentityQuery {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits `ids` into `prefix + id1%2Bid2...` URLs no longer than
/// [`MAX_URL_LENGTH`].
pub fn batch_urls(prefix: &str, ids: &[String]) -> Vec<String> {
    let mut urls = Vec::new();
    let mut current: Option<String> = None;
    for id in ids {
        current = Some(match current.take() {
            Some(mut url) if url.len() + ID_SEPARATOR.len() + id.len() <= MAX_URL_LENGTH => {
                url.push_str(ID_SEPARATOR);
                url.push_str(id);
                url
            }
            Some(full) => {
                urls.push(full);
                format!("{prefix}{id}")
            }
            None => format!("{prefix}{id}"),
        });
    }
    urls.extend(current);
    urls
}

/// Users and groups of the identity service.
///
/// Users resolved by id are cached for the lifetime of the store.
#[derive(Debug)]
pub struct IdentityStore<C> {
    client: Arc<C>,
    base_url: String,
    users: RwLock<HashMap<String, User>>,
    groups_by_name: RwLock<HashMap<String, Group>>,
    current: RwLock<Option<CurrentUser>>,
    current_in_flight: InFlight<CurrentUser>,
}

impl<C: HttpClient> IdentityStore<C> {
    /// Creates a store.
    pub fn new(client: Arc<C>, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.identity_url.clone(),
            users: RwLock::new(HashMap::new()),
            groups_by_name: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            current_in_flight: InFlight::new(),
        }
    }

    /// Forgets every cached user and group.
    pub fn clear_cache(&self) {
        self.users.write().clear();
        self.groups_by_name.write().clear();
        *self.current.write() = None;
    }

    /// Returns the logged in user with its groups.
    pub async fn current_user(&self) -> HbpResult<CurrentUser> {
        if let Some(user) = self.current.read().clone() {
            return Ok(user);
        }
        let me = format!("{}/user/me", self.base_url);
        let key = HttpRequest::get(me.as_str()).signature();
        let user = self
            .current_in_flight
            .run(&key, || async move {
                let (user, groups) = tokio::try_join!(
                    fetch_json::<C, User>(self.client.as_ref(), HttpRequest::get(me.as_str())),
                    fetch_json::<C, ListEnvelope<Group>>(
                        self.client.as_ref(),
                        HttpRequest::get(format!("{me}/groups")),
                    ),
                )?;
                Ok::<_, HbpError>(CurrentUser {
                    user: user.normalized(),
                    groups: groups.result,
                })
            })
            .await?;
        *self.current.write() = Some(user.clone());
        Ok(user)
    }

    /// Returns true if the current user belongs to one of `groups`.
    pub async fn is_group_member(&self, groups: &[&str]) -> HbpResult<bool> {
        let user = self.current_user().await?;
        Ok(groups.iter().any(|group| user.is_member(group)))
    }

    /// Resolves user and group ids. Unknown ids are missing from the map.
    pub async fn users_by_id(&self, ids: &[String]) -> HbpResult<HashMap<String, User>> {
        let mut found = HashMap::new();
        let mut users = Vec::new();
        let mut groups = Vec::new();
        {
            let cache = self.users.read();
            let mut seen = HashSet::new();
            for id in ids {
                if !seen.insert(id.as_str()) {
                    continue;
                }
                if let Some(user) = cache.get(id) {
                    found.insert(id.clone(), user.clone());
                } else if id.starts_with('S') {
                    groups.push(id.clone());
                } else {
                    users.push(id.clone());
                }
            }
        }

        let mut urls = batch_urls(&format!("{}/user?filter=id=", self.base_url), &users);
        urls.extend(batch_urls(
            &format!("{}/group?filter=id=", self.base_url),
            &groups,
        ));
        if !urls.is_empty() {
            debug!(users = users.len(), groups = groups.len(), requests = urls.len(), "resolving ids");
        }

        for url in urls {
            let page: ListEnvelope<User> =
                fetch_json(self.client.as_ref(), HttpRequest::get(url)).await?;
            let mut cache = self.users.write();
            for user in page.result {
                let user = user.normalized();
                cache.insert(user.id.clone(), user.clone());
                found.insert(user.id.clone(), user);
            }
        }
        Ok(found)
    }

    /// Lists users, or only the users managed by the current user.
    pub async fn list_users(
        &self,
        query: &IdentityQuery,
        managed_only: bool,
    ) -> HbpResult<ResultSet<C, User>> {
        let mut url = format!("{}/user", self.base_url);
        if managed_only {
            url.push_str("/managed");
        }
        ResultSet::paginated(
            Arc::clone(&self.client),
            query.apply(HttpRequest::get(url)),
            ResultSetOptions::new().with_result_key("result"),
        )
        .await
    }

    /// Creates a user.
    pub async fn create_user(&self, user: &User) -> HbpResult<User> {
        let body = serde_json::to_value(user)?;
        let _: Value =
            fetch_json(self.client.as_ref(), HttpRequest::post(format!("{}/user", self.base_url), body))
                .await?;
        Ok(user.clone())
    }

    /// Updates a user and returns its fresh profile.
    pub async fn update_user(&self, id: &str, data: Value) -> HbpResult<Option<User>> {
        let url = format!("{}/user/{id}", self.base_url);
        let _: Value = fetch_json(self.client.as_ref(), HttpRequest::put(url, data)).await?;

        self.users.write().remove(id);
        {
            let mut current = self.current.write();
            if current.as_ref().is_some_and(|c| c.user.id == id) {
                *current = None;
            }
        }
        let mut users = self.users_by_id(&[id.to_string()]).await?;
        Ok(users.remove(id))
    }

    /// Returns a group.
    pub async fn group(&self, id: &str) -> HbpResult<Group> {
        fetch_json(
            self.client.as_ref(),
            HttpRequest::get(format!("{}/group/{id}", self.base_url)),
        )
        .await
    }

    /// Returns the group with this name, `None` if there is none.
    ///
    /// Fails with `UnexpectedResult` when several groups carry the name.
    pub async fn group_by_name(&self, name: &str) -> HbpResult<Option<Group>> {
        if let Some(group) = self.groups_by_name.read().get(name).cloned() {
            return Ok(Some(group));
        }
        let set = self
            .list_groups(&IdentityQuery::new().with_filter("name", [name]))
            .await?;
        let mut groups = set.into_results();
        match groups.len() {
            0 => Ok(None),
            1 => {
                let group = groups.remove(0);
                self.groups_by_name
                    .write()
                    .insert(name.to_string(), group.clone());
                Ok(Some(group))
            }
            _ => Err(HbpError::unexpected_result(
                "More than one result has been retrieved",
            )),
        }
    }

    /// Lists the members of a group.
    pub async fn group_members(&self, id: &str) -> HbpResult<ResultSet<C, Value>> {
        self.members_request(HttpRequest::get(self.members_url(id)))
            .await
    }

    /// Adds users to a group and returns its members.
    pub async fn add_members(&self, id: &str, users: &[String]) -> HbpResult<ResultSet<C, Value>> {
        self.members_request(HttpRequest::put(self.members_url(id), json!({ "users": users })))
            .await
    }

    /// Removes users from a group and returns its members.
    pub async fn remove_members(
        &self,
        id: &str,
        users: &[String],
    ) -> HbpResult<ResultSet<C, Value>> {
        self.members_request(
            HttpRequest::delete(self.members_url(id)).with_body(json!({ "users": users })),
        )
        .await
    }

    /// Lists groups.
    pub async fn list_groups(&self, query: &IdentityQuery) -> HbpResult<ResultSet<C, Group>> {
        ResultSet::paginated(
            Arc::clone(&self.client),
            query.apply(HttpRequest::get(format!("{}/group/", self.base_url))),
            ResultSetOptions::default(),
        )
        .await
    }

    fn members_url(&self, id: &str) -> String {
        format!("{}/group/{id}/members", self.base_url)
    }

    async fn members_request(&self, request: HttpRequest) -> HbpResult<ResultSet<C, Value>> {
        ResultSet::paginated(Arc::clone(&self.client), request, ResultSetOptions::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(count: usize, width: usize) -> Vec<String> {
        (0..count).map(|i| format!("{i:0width$}")).collect()
    }

    #[test]
    fn query_params() {
        assert_eq!(
            IdentityQuery::new().params(),
            vec![
                ("page".to_string(), "0".to_string()),
                ("pageSize".to_string(), "10".to_string())
            ]
        );

        let query = IdentityQuery::new()
            .with_page(2)
            .with_page_size(50)
            .with_filter("displayName", ["ali*", "bob"])
            .with_filter("email", ["a@b.c"])
            .with_sort("-name")
            .with_sort("id");
        let params = query.params();
        assert_eq!(params[2], ("filter".into(), "displayName=ali*+bob,email=a@b.c".into()));
        assert_eq!(params[3], ("sort".into(), "-name,id".into()));
    }

    #[test]
    fn batch_urls_respect_the_limit() {
        assert!(batch_urls("u?filter=id=", &[]).is_empty());
        assert_eq!(
            batch_urls("u?filter=id=", &["1".into(), "2".into()]),
            vec!["u?filter=id=1%2B2"]
        );

        let prefix = "https://idm/user?filter=id=";
        let ids = ids(500, 6);
        let urls = batch_urls(prefix, &ids);
        assert!(urls.len() > 1);
        assert!(urls.iter().all(|u| u.len() <= MAX_URL_LENGTH));

        let rejoined: Vec<String> = urls
            .iter()
            .flat_map(|u| {
                u.trim_start_matches(prefix)
                    .split(ID_SEPARATOR)
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
            .collect();
        assert_eq!(rejoined, ids);
    }
}
