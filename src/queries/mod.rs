//! Query model layer
//!
//! A query model is a struct of filters. Every filter contributes optional
//! SQL fragments and named parameters; [`QueryBuilder`] concatenates them
//! into the pieces an endpoint splices into its SQL text.

pub mod filters;
pub mod params;

pub use filters::*;
pub use params::{
    decamelize, truncate_float, CommaSeparatedList, DateOrDateTime, QueryParams, SqlParams,
    SqlValue,
};

use std::collections::BTreeSet;

use crate::models::{AppError, AppResult, ValidationDetail};

/// One filter's contribution to a query
pub trait QueryFilter: Send + Sync {
    fn where_clause(&self) -> Option<String> {
        None
    }

    fn fields(&self) -> Option<String> {
        None
    }

    fn pagination(&self) -> Option<String> {
        None
    }

    fn order_by(&self) -> Option<String> {
        None
    }

    /// Adds this filter's named parameters
    fn bind(&self, _params: &mut SqlParams) {}
}

/// Built from raw query-string pairs. Errors are collected, not short
/// circuited, so a single response lists every bad field.
pub trait FromQueryParams: Sized {
    fn from_params(params: &QueryParams) -> Result<Self, Vec<ValidationDetail>>;

    /// Same as [`from_params`](Self::from_params) but as a 422 [`AppError`]
    fn parse(params: &QueryParams) -> AppResult<Self> {
        Self::from_params(params).map_err(AppError::validation_many)
    }
}

/// A composition of filters
pub trait QueryModel: Send + Sync {
    fn filters(&self) -> Vec<&dyn QueryFilter>;
}

/// Declares a query model struct whose fields are all filters.
///
/// ```
/// use openaq_api::query_model;
/// use openaq_api::queries::{CountryIsoQuery, IdSort, MonitorQuery, Paging, Sorting};
///
/// query_model! {
///     pub struct LocationsQueries {
///         pub paging: Paging,
///         pub iso: CountryIsoQuery,
///         pub monitor: MonitorQuery,
///         pub sorting: Sorting<IdSort>,
///     }
/// }
/// ```
#[macro_export]
macro_rules! query_model {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($fvis:vis $field:ident : $ty:ty),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $($fvis $field: $ty),+
        }

        impl $crate::queries::FromQueryParams for $name {
            fn from_params(
                params: &$crate::queries::QueryParams,
            ) -> ::std::result::Result<Self, ::std::vec::Vec<$crate::models::ValidationDetail>> {
                let mut errors = ::std::vec::Vec::new();
                $(
                    let $field = match <$ty as $crate::queries::FromQueryParams>::from_params(params) {
                        Ok(value) => Some(value),
                        Err(e) => {
                            errors.extend(e);
                            None
                        }
                    };
                )+
                if let ($(Some($field),)+) = ($($field,)+) {
                    if errors.is_empty() {
                        return Ok(Self { $($field),+ });
                    }
                }
                // Model-level errors may be raised by more than one filter.
                errors.dedup();
                Err(errors)
            }
        }

        impl $crate::queries::QueryModel for $name {
            fn filters(&self) -> ::std::vec::Vec<&dyn $crate::queries::QueryFilter> {
                vec![$(&self.$field as &dyn $crate::queries::QueryFilter),+]
            }
        }
    };
}

/// Concatenates the fragments of a model's filters
pub struct QueryBuilder<'a> {
    filters: Vec<&'a dyn QueryFilter>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new<M: QueryModel + ?Sized>(model: &'a M) -> Self {
        Self {
            filters: model.filters(),
        }
    }

    pub fn from_filters(filters: Vec<&'a dyn QueryFilter>) -> Self {
        Self { filters }
    }

    /// Distinct fragments in sorted order
    fn collect(&self, f: impl Fn(&dyn QueryFilter) -> Option<String>) -> Vec<String> {
        self.filters
            .iter()
            .filter_map(|filter| f(*filter))
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn where_clause(&self) -> String {
        let clauses = self.collect(|f| f.where_clause());
        if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join("\nAND "))
        }
    }

    pub fn fields(&self) -> String {
        let fields = self.collect(|f| f.fields());
        if fields.is_empty() {
            String::new()
        } else {
            format!("\n,{}", fields.join("\n,"))
        }
    }

    pub fn pagination(&self) -> String {
        let pagination = self.collect(|f| f.pagination());
        if pagination.is_empty() {
            String::new()
        } else {
            format!("\n{}", pagination.join("\n"))
        }
    }

    pub fn total(&self) -> &'static str {
        ", COUNT(1) OVER() as found"
    }

    pub fn order_by(&self) -> String {
        self.filters
            .iter()
            .find_map(|f| f.order_by())
            .unwrap_or_default()
    }

    pub fn params(&self) -> SqlParams {
        let mut params = SqlParams::new();
        for filter in &self.filters {
            filter.bind(&mut params);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    query_model! {
        struct Container {
            iso: CountryIsoQuery,
            monitor: MonitorQuery,
        }
    }

    query_model! {
        struct SortedContainer {
            iso: CountryIsoQuery,
            monitor: MonitorQuery,
            sorting: Sorting<IdSort>,
        }
    }

    query_model! {
        struct PagedRadius {
            paging: Paging,
            radius: RadiusQuery,
        }
    }

    query_model! {
        #[derive(Debug)]
        struct LocationsQueries {
            paging: Paging,
            radius: RadiusQuery,
            bbox: BboxQuery,
            iso: CountryIsoQuery,
            countries: CountryIdQuery,
        }
    }

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        QueryParams::from_pairs(pairs.iter().map(|(k, v)| (*k, v.to_string())))
    }

    fn radius() -> RadiusQuery {
        RadiusQuery::from_params(&params(&[("coordinates", "38.9072,-77.0369"), ("radius", "1000")])).unwrap()
    }

    #[test]
    fn test_params_method() {
        let q = Container::parse(&params(&[("iso", "us"), ("monitor", "true")])).unwrap();
        let p = QueryBuilder::new(&q).params();
        assert_eq!(p.len(), 2);
        assert_eq!(p.get("monitor"), Some(&SqlValue::Bool(true)));
        assert_eq!(p.get("iso"), Some(&SqlValue::Text("us".into())));
    }

    #[test]
    fn test_where_method_single() {
        let q = Container::parse(&params(&[("iso", "us")])).unwrap();
        assert_eq!(QueryBuilder::new(&q).where_clause(), "WHERE country->>'code' = :iso");
    }

    #[test]
    fn test_where_method_multiple() {
        let q = Container::parse(&params(&[("monitor", "true"), ("iso", "us")])).unwrap();
        assert_eq!(
            QueryBuilder::new(&q).where_clause(),
            "WHERE country->>'code' = :iso\nAND ismonitor = :monitor"
        );
    }

    #[test]
    fn test_where_method_empty() {
        let q = Container::parse(&params(&[])).unwrap();
        assert_eq!(QueryBuilder::new(&q).where_clause(), "");
    }

    #[test]
    fn test_fields_method_none() {
        let iso = CountryIsoQuery { iso: Some("us".into()) };
        assert_eq!(QueryBuilder::from_filters(vec![&iso]).fields(), "");
    }

    #[test]
    fn test_fields_method() {
        let r = radius();
        assert_eq!(
            QueryBuilder::from_filters(vec![&r]).fields(),
            "\n,ST_Distance(geog, ST_MakePoint(:lon, :lat)::geography) as distance"
        );
    }

    #[test]
    fn test_total_method() {
        let r = radius();
        assert_eq!(QueryBuilder::from_filters(vec![&r]).total(), ", COUNT(1) OVER() as found");
    }

    #[test]
    fn test_pagination_method() {
        let r = radius();
        assert_eq!(QueryBuilder::from_filters(vec![&r]).pagination(), "");

        let q = PagedRadius::parse(&params(&[
            ("coordinates", "38.9072,-77.0369"),
            ("radius", "1000"),
            ("limit", "1000"),
            ("page", "42"),
        ]))
        .unwrap();
        assert_eq!(QueryBuilder::new(&q).pagination(), "\nLIMIT :limit OFFSET :offset");
    }

    #[test]
    fn test_order_by_method() {
        let q = SortedContainer::parse(&params(&[("iso", "us"), ("monitor", "true")])).unwrap();
        assert_eq!(QueryBuilder::new(&q).order_by(), "ORDER BY id ASC");

        let q = Container::parse(&params(&[("iso", "us")])).unwrap();
        assert_eq!(QueryBuilder::new(&q).order_by(), "");
    }

    #[test]
    fn test_model_collects_all_errors() {
        let err = LocationsQueries::parse(&params(&[("limit", "0"), ("countries_id", "x")])).unwrap_err();
        assert_eq!(err.code, crate::models::ErrorCode::ApiValidation);
        assert_eq!(err.details.len(), 2);
    }

    #[test]
    fn test_model_radius_and_bbox_conflict() {
        let err = LocationsQueries::parse(&params(&[
            ("bbox", "-77.0984,38.9021,-77.0390,38.9384"),
            ("coordinates", "38.9072,-77.0369"),
            ("radius", "10"),
        ]))
        .unwrap_err();
        assert_eq!(err.details.len(), 1);
        assert_eq!(err.details[0].loc, vec!["query"]);
    }

    #[test]
    fn test_camel_case_params_reach_filters() {
        let q = LocationsQueries::parse(&params(&[("countriesId", "1,2")])).unwrap();
        assert_eq!(q.countries.countries_id, Some(vec![1, 2]));
        assert_eq!(
            QueryBuilder::new(&q).where_clause(),
            "WHERE (country->'id')::int = ANY (:countries_id)"
        );
    }
}
