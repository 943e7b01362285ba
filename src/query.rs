//! Listing parameters: sorting, pagination and free-text search
//!
//! Raw query pairs (`sort`, `order`, `limit`, `start`, `q`) are coerced into
//! [`ListParams`]. Values of the wrong type are ignored rather than rejected,
//! and the default ordering is newest first.

use crate::types::Job;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Name,
}

impl SortField {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "createdAt" => Some(SortField::CreatedAt),
            "updatedAt" => Some(SortField::UpdatedAt),
            "name" => Some(SortField::Name),
            _ => None,
        }
    }

    fn compare(self, a: &Job, b: &Job) -> Ordering {
        match self {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortField::Name => a.name.cmp(&b.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Coerced listing parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    pub sort: Vec<(SortField, SortOrder)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            sort: vec![(SortField::CreatedAt, SortOrder::Desc)],
            skip: None,
            limit: None,
            query: None,
        }
    }
}

impl ListParams {
    /// Build from raw query-string pairs
    ///
    /// ```
    /// use chartjobs::ListParams;
    ///
    /// let params = ListParams::from_pairs([("limit", "30"), ("start", "10")]);
    /// assert_eq!(params.limit, Some(30));
    /// assert_eq!(params.skip, Some(9));
    /// ```
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::default();
        let mut field = SortField::CreatedAt;
        let mut order = SortOrder::Desc;

        for (key, value) in pairs {
            let value = value.as_ref().trim();
            match key.as_ref() {
                "sort" => {
                    if let Some(f) = SortField::parse(value) {
                        field = f;
                    }
                }
                "order" => match value {
                    "asc" => order = SortOrder::Asc,
                    "desc" => order = SortOrder::Desc,
                    _ => {}
                },
                "limit" => {
                    if let Ok(limit) = value.parse::<usize>() {
                        if limit > 0 {
                            params.limit = Some(limit);
                        }
                    }
                }
                "start" => {
                    if let Ok(start) = value.parse::<usize>() {
                        if start > 0 {
                            params.skip = Some(start - 1);
                        }
                    }
                }
                "q" => {
                    if !value.is_empty() {
                        params.query = Some(value.to_string());
                    }
                }
                _ => {}
            }
        }

        params.sort = vec![(field, order)];
        params
    }
}

/// A job query as handed to a [`JobStore`](crate::store::JobStore)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobQuery {
    /// Restrict to enabled or disabled jobs
    pub enabled: Option<bool>,
    pub params: ListParams,
}

impl JobQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn enabled() -> Self {
        Self {
            enabled: Some(true),
            params: ListParams::default(),
        }
    }

    pub fn from_params(params: ListParams) -> Self {
        Self {
            enabled: None,
            params,
        }
    }

    /// Filter, sort and page an in-memory collection
    pub fn apply(&self, jobs: impl IntoIterator<Item = Job>) -> Vec<Job> {
        let needle = self.params.query.as_ref().map(|q| q.to_lowercase());

        let mut jobs: Vec<Job> = jobs
            .into_iter()
            .filter(|job| self.enabled.map_or(true, |enabled| job.enabled == enabled))
            .filter(|job| match &needle {
                Some(needle) => {
                    job.name.to_lowercase().contains(needle)
                        || job.command.to_lowercase().contains(needle)
                }
                None => true,
            })
            .collect();

        jobs.sort_by(|a, b| {
            self.params
                .sort
                .iter()
                .map(|(field, order)| match order {
                    SortOrder::Asc => field.compare(a, b),
                    SortOrder::Desc => field.compare(b, a),
                })
                .find(|ord| ord.is_ne())
                .unwrap_or_else(|| a.id.cmp(&b.id))
        });

        let skip = self.params.skip.unwrap_or(0);
        let limit = self.params.limit.unwrap_or(usize::MAX);
        jobs.into_iter().skip(skip).take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pairs(items: &[(&str, &str)]) -> ListParams {
        ListParams::from_pairs(items.iter().copied())
    }

    #[test]
    fn test_default_sort() {
        let params = pairs(&[]);
        assert_eq!(params, ListParams::default());
        assert_eq!(params.sort, vec![(SortField::CreatedAt, SortOrder::Desc)]);
    }

    #[test]
    fn test_sort_and_order() {
        let params = pairs(&[("sort", "updatedAt"), ("order", "asc")]);
        assert_eq!(params.sort, vec![(SortField::UpdatedAt, SortOrder::Asc)]);
    }

    #[test]
    fn test_limit_start_and_q() {
        let params = pairs(&[("limit", "30"), ("start", "10"), ("q", "code collaborator")]);
        assert_eq!(params.limit, Some(30));
        assert_eq!(params.skip, Some(9));
        assert_eq!(params.query.as_deref(), Some("code collaborator"));
    }

    #[test]
    fn test_invalid_values_are_ignored() {
        let params = pairs(&[
            ("limit", "invalid"),
            ("start", "invalid"),
            ("q", ""),
            ("sort", "password"),
            ("order", "sideways"),
        ]);
        assert_eq!(params, ListParams::default());
    }

    #[test]
    fn test_apply_filters_sorts_and_pages() {
        let base = chrono::Utc::now();
        let jobs: Vec<Job> = (0..5)
            .map(|i| {
                let mut job = Job::new(format!("job-{}", i), "* * * * *", "echo");
                job.created_at = base + Duration::seconds(i);
                job.enabled = i % 2 == 0;
                job
            })
            .collect();

        let newest_first = JobQuery::all().apply(jobs.clone());
        assert_eq!(newest_first[0].name, "job-4");

        let enabled = JobQuery::enabled().apply(jobs.clone());
        assert_eq!(enabled.len(), 3);

        let paged = JobQuery::from_params(pairs(&[("order", "asc"), ("limit", "2"), ("start", "2")]))
            .apply(jobs.clone());
        let names: Vec<_> = paged.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["job-1", "job-2"]);

        let searched = JobQuery::from_params(pairs(&[("q", "JOB-3")])).apply(jobs);
        assert_eq!(searched.len(), 1);
    }
}
