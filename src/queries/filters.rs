//! Query filters
//!
//! Each filter owns one or a few query-string fields and knows the SQL
//! fragment it contributes. Filters are combined into query models with
//! [`query_model!`](crate::query_model).

use std::fmt;

use super::params::{truncate_float, DateOrDateTime, QueryParams, SqlParams, SqlValue};
use super::{FromQueryParams, QueryFilter};
use crate::models::ValidationDetail;

type FieldErrors = Vec<ValidationDetail>;

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 1000;
pub const MAX_RADIUS: i64 = 25000;

fn greater_than_zero(field: &str) -> ValidationDetail {
    ValidationDetail::query(field, "Input should be greater than 0", "greater_than")
}

// ============================================
// Paging
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub limit: i64,
    pub page: i64,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            page: 1,
        }
    }
}

impl Paging {
    /// Row offset of the page, saturating at `i64::MAX` for huge pages
    pub fn offset(&self) -> i64 {
        page_offset(self.page, self.limit)
    }
}

/// `|(page - 1) * limit|` without overflow
pub fn page_offset(page: i64, limit: i64) -> i64 {
    page.saturating_sub(1).saturating_mul(limit).saturating_abs()
}

impl FromQueryParams for Paging {
    fn from_params(params: &QueryParams) -> Result<Self, FieldErrors> {
        let mut errors = Vec::new();
        let limit = match params.int("limit") {
            Ok(Some(v)) if v <= 0 => {
                errors.push(greater_than_zero("limit"));
                DEFAULT_LIMIT
            }
            Ok(Some(v)) if v > MAX_LIMIT => {
                errors.push(ValidationDetail::query(
                    "limit",
                    format!("Input should be less than or equal to {}", MAX_LIMIT),
                    "less_than_equal",
                ));
                DEFAULT_LIMIT
            }
            Ok(v) => v.unwrap_or(DEFAULT_LIMIT),
            Err(e) => {
                errors.push(e);
                DEFAULT_LIMIT
            }
        };
        let page = match params.int("page") {
            Ok(Some(v)) if v <= 0 => {
                errors.push(greater_than_zero("page"));
                1
            }
            Ok(v) => v.unwrap_or(1),
            Err(e) => {
                errors.push(e);
                1
            }
        };
        if errors.is_empty() {
            Ok(Self { limit, page })
        } else {
            Err(errors)
        }
    }
}

impl QueryFilter for Paging {
    fn pagination(&self) -> Option<String> {
        Some("LIMIT :limit OFFSET :offset".to_string())
    }

    fn bind(&self, params: &mut SqlParams) {
        params.insert("limit".into(), SqlValue::Int(self.limit));
        params.insert("page".into(), SqlValue::Int(self.page));
        params.insert("offset".into(), SqlValue::Int(self.offset()));
    }
}

// ============================================
// Id list filters
// ============================================

macro_rules! id_list_filter {
    ($(#[$meta:meta])* $name:ident, $field:ident, $sql:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct $name {
            pub $field: Option<Vec<i32>>,
        }

        impl FromQueryParams for $name {
            fn from_params(params: &QueryParams) -> Result<Self, FieldErrors> {
                params
                    .int_list(stringify!($field))
                    .map(|$field| Self { $field })
                    .map_err(|e| vec![e])
            }
        }

        impl QueryFilter for $name {
            fn where_clause(&self) -> Option<String> {
                self.$field.as_ref().map(|_| $sql.to_string())
            }

            fn bind(&self, params: &mut SqlParams) {
                if let Some(ids) = &self.$field {
                    params.insert(stringify!($field).into(), SqlValue::IntList(ids.clone()));
                }
            }
        }
    };
}

id_list_filter!(
    /// Locations measuring any of the given parameters
    ParametersQuery,
    parameters_id,
    "parameter_ids && :parameters_id"
);
id_list_filter!(LicenseQuery, licenses_id, "license_ids && :licenses_id");
id_list_filter!(InstrumentsQuery, instruments_id, "instrument_ids && :instruments_id");
id_list_filter!(
    ManufacturersQuery,
    manufacturers_id,
    "manufacturer_ids && :manufacturers_id"
);
id_list_filter!(
    ProviderQuery,
    providers_id,
    "(provider->'id')::int = ANY (:providers_id)"
);
id_list_filter!(
    OwnerQuery,
    owner_contacts_id,
    "(owner->'id')::int = ANY (:owner_contacts_id)"
);
id_list_filter!(
    CountryIdQuery,
    countries_id,
    "(country->'id')::int = ANY (:countries_id)"
);

// ============================================
// Flags
// ============================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MobileQuery {
    pub mobile: Option<bool>,
}

impl FromQueryParams for MobileQuery {
    fn from_params(params: &QueryParams) -> Result<Self, FieldErrors> {
        params
            .bool("mobile")
            .map(|mobile| Self { mobile })
            .map_err(|e| vec![e])
    }
}

impl QueryFilter for MobileQuery {
    fn where_clause(&self) -> Option<String> {
        self.mobile.map(|_| "ismobile = :mobile".to_string())
    }

    fn bind(&self, params: &mut SqlParams) {
        if let Some(v) = self.mobile {
            params.insert("mobile".into(), SqlValue::Bool(v));
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorQuery {
    pub monitor: Option<bool>,
}

impl FromQueryParams for MonitorQuery {
    fn from_params(params: &QueryParams) -> Result<Self, FieldErrors> {
        params
            .bool("monitor")
            .map(|monitor| Self { monitor })
            .map_err(|e| vec![e])
    }
}

impl QueryFilter for MonitorQuery {
    fn where_clause(&self) -> Option<String> {
        self.monitor.map(|_| "ismonitor = :monitor".to_string())
    }

    fn bind(&self, params: &mut SqlParams) {
        if let Some(v) = self.monitor {
            params.insert("monitor".into(), SqlValue::Bool(v));
        }
    }
}

// ============================================
// Country
// ============================================

/// ISO 3166-1 alpha-2 country filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryIsoQuery {
    pub iso: Option<String>,
}

impl FromQueryParams for CountryIsoQuery {
    fn from_params(params: &QueryParams) -> Result<Self, FieldErrors> {
        let iso = params.string("iso").map_err(|e| vec![e])?;
        if iso.is_some() && params.contains("countries_id") {
            return Err(vec![ValidationDetail::model(
                "Cannot pass both countries_id and iso code",
            )]);
        }
        Ok(Self { iso })
    }
}

impl QueryFilter for CountryIsoQuery {
    fn where_clause(&self) -> Option<String> {
        self.iso.as_ref().map(|_| "country->>'code' = :iso".to_string())
    }

    fn bind(&self, params: &mut SqlParams) {
        if let Some(iso) = &self.iso {
            params.insert("iso".into(), SqlValue::Text(iso.clone()));
        }
    }
}

// ============================================
// Time ranges
// ============================================

/// Zoned values compare directly; dates and naive timestamps are read in
/// the row's local time zone column.
fn local_time_clause(column: &str, op: &str, name: &str, tz_column: &str, value: &DateOrDateTime) -> String {
    if value.is_zoned() {
        format!("{} {} :{}", column, op, name)
    } else {
        format!(
            "{} {} (:{}::timestamp AT TIME ZONE {})",
            column, op, name, tz_column
        )
    }
}

macro_rules! datetime_filter {
    ($(#[$meta:meta])* $name:ident, $field:ident, $column:expr, $op:expr, $tz:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name {
            pub $field: Option<DateOrDateTime>,
        }

        impl FromQueryParams for $name {
            fn from_params(params: &QueryParams) -> Result<Self, FieldErrors> {
                params
                    .date_or_datetime(stringify!($field))
                    .map(|$field| Self { $field })
                    .map_err(|e| vec![e])
            }
        }

        impl QueryFilter for $name {
            fn where_clause(&self) -> Option<String> {
                self.$field
                    .as_ref()
                    .map(|v| local_time_clause($column, $op, stringify!($field), $tz, v))
            }

            fn bind(&self, params: &mut SqlParams) {
                if let Some(v) = &self.$field {
                    params.insert(stringify!($field).into(), v.to_sql());
                }
            }
        }
    };
}

datetime_filter!(
    /// Exclusive lower bound on `datetime`
    DatetimeFromQuery,
    datetime_from,
    "datetime",
    ">",
    "timezone"
);
datetime_filter!(
    /// Inclusive upper bound on `datetime`
    DatetimeToQuery,
    datetime_to,
    "datetime",
    "<=",
    "timezone"
);
datetime_filter!(
    /// Rows last updated after the given time
    DatetimeMinQuery,
    datetime_min,
    "datetime_last",
    ">",
    "tzid"
);

macro_rules! date_filter {
    ($name:ident, $field:ident, $op:expr) => {
        /// Day bound on `datetime`. Timestamps are reduced to their calendar
        /// date in their own offset.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name {
            pub $field: Option<chrono::NaiveDate>,
        }

        impl FromQueryParams for $name {
            fn from_params(params: &QueryParams) -> Result<Self, FieldErrors> {
                params
                    .date_or_datetime(stringify!($field))
                    .map(|v| Self {
                        $field: v.map(|d| d.date()),
                    })
                    .map_err(|e| vec![e])
            }
        }

        impl QueryFilter for $name {
            fn where_clause(&self) -> Option<String> {
                self.$field
                    .map(|_| format!("datetime {} :{}::date", $op, stringify!($field)))
            }

            fn bind(&self, params: &mut SqlParams) {
                if let Some(d) = self.$field {
                    params.insert(stringify!($field).into(), SqlValue::Date(d));
                }
            }
        }
    };
}

date_filter!(DateFromQuery, date_from, ">=");
date_filter!(DateToQuery, date_to, "<=");

// ============================================
// Aggregation periods
// ============================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PeriodName {
    #[default]
    Hour,
    Day,
    Month,
    Year,
    /// hour of day
    Hod,
    /// day of week
    Dow,
    /// month of year
    Moy,
}

impl PeriodName {
    pub const ALL: [PeriodName; 7] = [
        Self::Hour,
        Self::Day,
        Self::Month,
        Self::Year,
        Self::Hod,
        Self::Dow,
        Self::Moy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
            Self::Hod => "hod",
            Self::Dow => "dow",
            Self::Moy => "moy",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == value)
    }

    fn from_field(params: &QueryParams, field: &str) -> Result<Self, FieldErrors> {
        match params.get(field).map_err(|e| vec![e])? {
            None => Ok(Self::default()),
            Some(v) => Self::parse(v).ok_or_else(|| {
                let expected = Self::ALL
                    .iter()
                    .map(|p| format!("'{}'", p.as_str()))
                    .collect::<Vec<_>>()
                    .join(", ");
                vec![ValidationDetail::query(
                    field,
                    format!("Input should be {}", expected),
                    "enum",
                )]
            }),
        }
    }
}

impl fmt::Display for PeriodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `period_name`, only bound as a parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodNameQuery {
    pub period_name: PeriodName,
}

impl FromQueryParams for PeriodNameQuery {
    fn from_params(params: &QueryParams) -> Result<Self, FieldErrors> {
        PeriodName::from_field(params, "period_name").map(|period_name| Self { period_name })
    }
}

impl QueryFilter for PeriodNameQuery {
    fn bind(&self, params: &mut SqlParams) {
        params.insert(
            "period_name".into(),
            SqlValue::Text(self.period_name.as_str().to_string()),
        );
    }
}

/// `temporal`, the aggregation period for trend queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemporalQuery {
    pub temporal: PeriodName,
}

impl FromQueryParams for TemporalQuery {
    fn from_params(params: &QueryParams) -> Result<Self, FieldErrors> {
        PeriodName::from_field(params, "temporal").map(|temporal| Self { temporal })
    }
}

impl QueryFilter for TemporalQuery {
    fn bind(&self, params: &mut SqlParams) {
        params.insert(
            "temporal".into(),
            SqlValue::Text(self.temporal.as_str().to_string()),
        );
    }
}

// ============================================
// Spatial
// ============================================

/// Point and radius search
#[derive(Debug, Clone, PartialEq)]
pub struct RadiusQuery {
    pub coordinates: Option<String>,
    pub radius: Option<i64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    geometry_field: &'static str,
}

impl Default for RadiusQuery {
    fn default() -> Self {
        Self {
            coordinates: None,
            radius: None,
            lat: None,
            lon: None,
            geometry_field: "geog",
        }
    }
}

impl RadiusQuery {
    /// Use another geography column for the distance and search clauses
    pub fn with_geometry_field(mut self, field: &'static str) -> Self {
        self.geometry_field = field;
        self
    }

    fn active(&self) -> bool {
        self.radius.is_some() && self.coordinates.is_some()
    }

    pub fn fields_for(&self, geometry_field: &str) -> Option<String> {
        self.active().then(|| {
            format!(
                "ST_Distance({}, ST_MakePoint(:lon, :lat)::geography) as distance",
                geometry_field
            )
        })
    }

    pub fn where_for(&self, geometry_field: &str) -> Option<String> {
        self.active().then(|| {
            format!(
                "ST_DWithin(ST_MakePoint(:lon, :lat)::geography, {}, :radius)",
                geometry_field
            )
        })
    }
}

fn parse_coordinates(value: &str) -> Result<(f64, f64), ValidationDetail> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| {
            ValidationDetail::query(
                "coordinates",
                "String should match pattern '^(-)?(?:90(?:\\.0{1,4})?|((?:|[1-8])[0-9])(?:\\.[0-9]{1,4})?),(-)?(?:180(?:\\.0{1,4})?|((?:|[1-9]|1[0-7])[0-9])(?:\\.[0-9]{1,4})?)$'",
                "string_pattern_mismatch",
            )
        })?;
    let (lat, lon) = match parts.as_slice() {
        [lat, lon] => (*lat, *lon),
        _ => {
            return Err(ValidationDetail::query(
                "coordinates",
                "Value error, Coordinates must be a latitude,longitude pair",
                "value_error",
            ))
        }
    };
    let mut errors = Vec::new();
    if !(-90.0..=90.0).contains(&lat) {
        errors.push("Latitude must be between -90 and 90");
    }
    if !(-180.0..=180.0).contains(&lon) {
        errors.push("Longitude must be between -180 and 180");
    }
    if !errors.is_empty() {
        return Err(ValidationDetail::query(
            "coordinates",
            format!("Value error, Invalid coordinates. Error(s): {}", errors.join(" ")),
            "value_error",
        ));
    }
    Ok((lat, lon))
}

impl FromQueryParams for RadiusQuery {
    fn from_params(params: &QueryParams) -> Result<Self, FieldErrors> {
        let coordinates = params.string("coordinates");
        let radius = params.int("radius");

        if params.contains("bbox") && (params.contains("coordinates") || params.contains("radius")) {
            return Err(vec![ValidationDetail::model(
                "Cannot pass both bounding box and coordinate/radius query in the same URL",
            )]);
        }

        let mut errors = Vec::new();
        let coordinates = coordinates.unwrap_or_else(|e| {
            errors.push(e);
            None
        });
        let radius = match radius {
            Ok(Some(r)) if r <= 0 => {
                errors.push(greater_than_zero("radius"));
                None
            }
            Ok(Some(r)) if r > MAX_RADIUS => {
                errors.push(ValidationDetail::query(
                    "radius",
                    format!("Input should be less than or equal to {}", MAX_RADIUS),
                    "less_than_equal",
                ));
                None
            }
            Ok(r) => r,
            Err(e) => {
                errors.push(e);
                None
            }
        };

        let mut lat = None;
        let mut lon = None;
        if let Some(c) = &coordinates {
            match parse_coordinates(c) {
                Ok((y, x)) => {
                    lat = Some(truncate_float(y, 4));
                    lon = Some(truncate_float(x, 4));
                }
                Err(e) => errors.push(e),
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        match (&coordinates, radius) {
            (Some(_), None) => Err(vec![ValidationDetail::model(
                "Coordinates must be passed with a radius",
            )]),
            (None, Some(_)) => Err(vec![ValidationDetail::model(
                "Radius must be passed with a coordinate pair",
            )]),
            _ => Ok(Self {
                coordinates,
                radius,
                lat,
                lon,
                ..Self::default()
            }),
        }
    }
}

impl QueryFilter for RadiusQuery {
    fn where_clause(&self) -> Option<String> {
        self.where_for(self.geometry_field)
    }

    fn fields(&self) -> Option<String> {
        self.fields_for(self.geometry_field)
    }

    fn bind(&self, params: &mut SqlParams) {
        if let Some(c) = &self.coordinates {
            params.insert("coordinates".into(), SqlValue::Text(c.clone()));
        }
        if let Some(r) = self.radius {
            params.insert("radius".into(), SqlValue::Int(r));
        }
        if let Some(lat) = self.lat {
            params.insert("lat".into(), SqlValue::Float(lat));
        }
        if let Some(lon) = self.lon {
            params.insert("lon".into(), SqlValue::Float(lon));
        }
    }
}

/// WGS 84 bounding box
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BboxQuery {
    pub bbox: Option<String>,
    pub minx: Option<f64>,
    pub miny: Option<f64>,
    pub maxx: Option<f64>,
    pub maxy: Option<f64>,
}

fn parse_bbox(value: &str) -> Result<[f64; 4], ValidationDetail> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()
        .filter(|p: &Vec<f64>| p.len() == 4)
        .ok_or_else(|| {
            ValidationDetail::query(
                "bbox",
                "String should match pattern '-?\\d{1,3}\\.?\\d*,-?\\d{1,2}\\.?\\d*,-?\\d{1,3}\\.?\\d*,-?\\d{1,2}\\.?\\d*'",
                "string_pattern_mismatch",
            )
        })?;
    let [minx, miny, maxx, maxy] = [parts[0], parts[1], parts[2], parts[3]];

    let mut errors = Vec::new();
    if !(-180.0..=180.0).contains(&minx) {
        errors.push("X min must be between -180 and 180");
    }
    if !(-90.0..=90.0).contains(&miny) {
        errors.push("Y min must be between -90 and 90");
    }
    if !(-180.0..=180.0).contains(&maxx) {
        errors.push("X max must be between -180 and 180");
    }
    if !(-90.0..=90.0).contains(&maxy) {
        errors.push("Y max must be between -90 and 90");
    }
    if minx > maxx {
        errors.push("X max must be greater than or equal to X min");
    }
    if miny > maxy {
        errors.push("Y max must be greater than or equal to Y min");
    }
    if !errors.is_empty() {
        return Err(ValidationDetail::query(
            "bbox",
            format!("Value error, Invalid bounding box. Error(s): {}", errors.join(" ")),
            "value_error",
        ));
    }
    Ok([minx, miny, maxx, maxy])
}

impl FromQueryParams for BboxQuery {
    fn from_params(params: &QueryParams) -> Result<Self, FieldErrors> {
        let bbox = params.string("bbox").map_err(|e| vec![e])?;
        match bbox {
            None => Ok(Self::default()),
            Some(raw) => {
                let [minx, miny, maxx, maxy] = parse_bbox(&raw).map_err(|e| vec![e])?;
                Ok(Self {
                    bbox: Some(raw),
                    minx: Some(truncate_float(minx, 4)),
                    miny: Some(truncate_float(miny, 4)),
                    maxx: Some(truncate_float(maxx, 4)),
                    maxy: Some(truncate_float(maxy, 4)),
                })
            }
        }
    }
}

impl QueryFilter for BboxQuery {
    fn where_clause(&self) -> Option<String> {
        self.bbox
            .as_ref()
            .map(|_| "ST_MakeEnvelope(:minx, :miny, :maxx, :maxy, 4326) && geom".to_string())
    }

    fn bind(&self, params: &mut SqlParams) {
        if let Some(b) = &self.bbox {
            params.insert("bbox".into(), SqlValue::Text(b.clone()));
        }
        for (name, value) in [
            ("minx", self.minx),
            ("miny", self.miny),
            ("maxx", self.maxx),
            ("maxy", self.maxy),
        ] {
            if let Some(v) = value {
                params.insert(name.into(), SqlValue::Float(v));
            }
        }
    }
}

// ============================================
// Sorting
// ============================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Columns a model may be ordered by
pub trait SortField: Copy + Send + Sync + 'static {
    const DEFAULT: Self;
    const ALL: &'static [Self];

    fn column(&self) -> &'static str;
}

/// The common `order_by=id` choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSort {
    Id,
}

impl SortField for IdSort {
    const DEFAULT: Self = Self::Id;
    const ALL: &'static [Self] = &[Self::Id];

    fn column(&self) -> &'static str {
        "id"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sorting<F: SortField> {
    pub order_by: F,
    pub sort_order: SortOrder,
}

impl<F: SortField> Default for Sorting<F> {
    fn default() -> Self {
        Self {
            order_by: F::DEFAULT,
            sort_order: SortOrder::Asc,
        }
    }
}

impl<F: SortField> FromQueryParams for Sorting<F> {
    fn from_params(params: &QueryParams) -> Result<Self, FieldErrors> {
        let mut errors = Vec::new();
        let order_by = match params.get("order_by") {
            Ok(None) => Some(F::DEFAULT),
            Ok(Some(v)) => {
                let found = F::ALL
                    .iter()
                    .copied()
                    .find(|f| f.column().eq_ignore_ascii_case(v));
                if found.is_none() {
                    let expected = F::ALL
                        .iter()
                        .map(|f| format!("'{}'", f.column()))
                        .collect::<Vec<_>>()
                        .join(", ");
                    errors.push(ValidationDetail::query(
                        "order_by",
                        format!("Input should be {}", expected),
                        "enum",
                    ));
                }
                found
            }
            Err(e) => {
                errors.push(e);
                None
            }
        };
        let sort_order = match params.get("sort_order") {
            Ok(None) => Some(SortOrder::Asc),
            Ok(Some(v)) if v.eq_ignore_ascii_case("asc") => Some(SortOrder::Asc),
            Ok(Some(v)) if v.eq_ignore_ascii_case("desc") => Some(SortOrder::Desc),
            Ok(Some(_)) => {
                errors.push(ValidationDetail::query(
                    "sort_order",
                    "Input should be 'asc' or 'desc'",
                    "enum",
                ));
                None
            }
            Err(e) => {
                errors.push(e);
                None
            }
        };
        match (order_by, sort_order) {
            (Some(order_by), Some(sort_order)) if errors.is_empty() => Ok(Self {
                order_by,
                sort_order,
            }),
            _ => Err(errors),
        }
    }
}

impl<F: SortField> QueryFilter for Sorting<F> {
    fn order_by(&self) -> Option<String> {
        Some(format!(
            "ORDER BY {} {}",
            self.order_by.column().to_lowercase(),
            self.sort_order.as_sql()
        ))
    }
}

// ============================================
// Path ids
// ============================================

/// Single resource id taken from the URL path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathIdQuery {
    name: &'static str,
    column: &'static str,
    pub value: i64,
}

impl PathIdQuery {
    pub fn new(name: &'static str, column: &'static str, value: i64) -> Result<Self, ValidationDetail> {
        if value < 1 {
            return Err(ValidationDetail::path(
                name,
                "Input should be greater than 0",
                "greater_than",
            ));
        }
        Ok(Self {
            name,
            column,
            value,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl QueryFilter for PathIdQuery {
    fn where_clause(&self) -> Option<String> {
        Some(format!("{} = :{}", self.column, self.name))
    }

    fn bind(&self, params: &mut SqlParams) {
        params.insert(self.name.into(), SqlValue::Int(self.value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        QueryParams::from_pairs(pairs.iter().map(|(k, v)| (*k, v.to_string())))
    }

    fn bound<F: QueryFilter>(filter: &F) -> SqlParams {
        let mut p = SqlParams::new();
        filter.bind(&mut p);
        p
    }

    #[test]
    fn test_mobile_has_value() {
        let q = MobileQuery::from_params(&params(&[("mobile", "true")])).unwrap();
        assert_eq!(q.where_clause().as_deref(), Some("ismobile = :mobile"));
        assert_eq!(bound(&q).get("mobile"), Some(&SqlValue::Bool(true)));
    }

    #[test]
    fn test_mobile_no_value() {
        let q = MobileQuery::from_params(&params(&[])).unwrap();
        assert_eq!(q.where_clause(), None);
        assert!(bound(&q).is_empty());
    }

    #[test]
    fn test_monitor_has_value() {
        let q = MonitorQuery { monitor: Some(true) };
        assert_eq!(q.where_clause().as_deref(), Some("ismonitor = :monitor"));
    }

    #[test]
    fn test_datetime_from_wheres() {
        let date = DatetimeFromQuery::from_params(&params(&[("datetime_from", "2022-10-01")])).unwrap();
        assert_eq!(
            date.where_clause().as_deref(),
            Some("datetime > (:datetime_from::timestamp AT TIME ZONE timezone)")
        );
        assert_eq!(
            bound(&date).get("datetime_from"),
            Some(&SqlValue::Date(NaiveDate::from_ymd_opt(2022, 10, 1).unwrap()))
        );

        let tz = DatetimeFromQuery::from_params(&params(&[("datetime_from", "2022-10-01T14:47:27-00:00")])).unwrap();
        assert_eq!(tz.where_clause().as_deref(), Some("datetime > :datetime_from"));

        let naive = DatetimeFromQuery::from_params(&params(&[("datetime_from", "2022-10-01T14:47:27")])).unwrap();
        assert_eq!(
            naive.where_clause().as_deref(),
            Some("datetime > (:datetime_from::timestamp AT TIME ZONE timezone)")
        );
    }

    #[test]
    fn test_datetime_to_wheres() {
        let date = DatetimeToQuery::from_params(&params(&[("datetime_to", "2022-10-01")])).unwrap();
        assert_eq!(
            date.where_clause().as_deref(),
            Some("datetime <= (:datetime_to::timestamp AT TIME ZONE timezone)")
        );
        let tz = DatetimeToQuery::from_params(&params(&[("datetime_to", "2022-10-01T14:47:27-00:00")])).unwrap();
        assert_eq!(tz.where_clause().as_deref(), Some("datetime <= :datetime_to"));
        assert_eq!(DatetimeToQuery::default().where_clause(), None);
    }

    #[test]
    fn test_date_from_and_to() {
        for value in ["2022-10-01", "2022-10-01T14:47:27-00:00", "2022-10-01T14:47:27"] {
            let from = DateFromQuery::from_params(&params(&[("date_from", value)])).unwrap();
            assert_eq!(from.where_clause().as_deref(), Some("datetime >= :date_from::date"));
            assert_eq!(from.date_from, NaiveDate::from_ymd_opt(2022, 10, 1));

            let to = DateToQuery::from_params(&params(&[("date_to", value)])).unwrap();
            assert_eq!(to.where_clause().as_deref(), Some("datetime <= :date_to::date"));
        }
    }

    #[test]
    fn test_datetime_min() {
        assert_eq!(DatetimeMinQuery::default().where_clause(), None);
        for value in ["2024-01-01", "2024-01-01 01:01:01"] {
            let q = DatetimeMinQuery::from_params(&params(&[("datetime_min", value)])).unwrap();
            assert_eq!(
                q.where_clause().as_deref(),
                Some("datetime_last > (:datetime_min::timestamp AT TIME ZONE tzid)")
            );
        }
        let q = DatetimeMinQuery::from_params(&params(&[("datetime_min", "2024-01-01 01:01:01-00:00")])).unwrap();
        assert_eq!(q.where_clause().as_deref(), Some("datetime_last > :datetime_min"));
    }

    #[test]
    fn test_id_list_filters() {
        let p = params(&[
            ("parameters_id", "1,2,3"),
            ("licenses_id", "1,2,3"),
            ("providers_id", "1,2,3"),
            ("countries_id", "1,2,3"),
            ("instruments_id", "1,2,3"),
            ("owner_contacts_id", "1,2,3"),
            ("manufacturers_id", "1,2,3"),
        ]);
        let parameters = ParametersQuery::from_params(&p).unwrap();
        assert_eq!(parameters.where_clause().as_deref(), Some("parameter_ids && :parameters_id"));
        assert_eq!(
            bound(&parameters).get("parameters_id"),
            Some(&SqlValue::IntList(vec![1, 2, 3]))
        );
        assert_eq!(
            LicenseQuery::from_params(&p).unwrap().where_clause().as_deref(),
            Some("license_ids && :licenses_id")
        );
        assert_eq!(
            ProviderQuery::from_params(&p).unwrap().where_clause().as_deref(),
            Some("(provider->'id')::int = ANY (:providers_id)")
        );
        assert_eq!(
            CountryIdQuery::from_params(&p).unwrap().where_clause().as_deref(),
            Some("(country->'id')::int = ANY (:countries_id)")
        );
        assert_eq!(
            InstrumentsQuery::from_params(&p).unwrap().where_clause().as_deref(),
            Some("instrument_ids && :instruments_id")
        );
        assert_eq!(
            OwnerQuery::from_params(&p).unwrap().where_clause().as_deref(),
            Some("(owner->'id')::int = ANY (:owner_contacts_id)")
        );
        assert_eq!(
            ManufacturersQuery::from_params(&p).unwrap().where_clause().as_deref(),
            Some("manufacturer_ids && :manufacturers_id")
        );
        assert_eq!(ProviderQuery::default().where_clause(), None);
    }

    #[test]
    fn test_country_iso() {
        let q = CountryIsoQuery::from_params(&params(&[("iso", "us")])).unwrap();
        assert_eq!(q.where_clause().as_deref(), Some("country->>'code' = :iso"));
        assert_eq!(bound(&q).get("iso"), Some(&SqlValue::Text("us".into())));
    }

    #[test]
    fn test_country_iso_conflicts_with_ids() {
        let err = CountryIsoQuery::from_params(&params(&[("iso", "us"), ("countries_id", "1")])).unwrap_err();
        assert_eq!(err[0].loc, vec!["query"]);
        assert!(err[0].msg.contains("Cannot pass both countries_id and iso code"));
    }

    #[test]
    fn test_radius_requires_both_inputs() {
        assert!(RadiusQuery::from_params(&params(&[("radius", "1000")])).is_err());
        assert!(RadiusQuery::from_params(&params(&[("coordinates", "38.907,-77.037")])).is_err());
    }

    #[test]
    fn test_radius_coordinate_ranges() {
        for coords in ["91.907,-77.037", "-91.907,-77.037", "-81.907,197.037", "-81.907,-197.037"] {
            let p = params(&[("coordinates", coords), ("radius", "1000")]);
            assert!(RadiusQuery::from_params(&p).is_err(), "{} should be rejected", coords);
        }
    }

    #[test]
    fn test_radius_range() {
        for radius in ["-10", "0", "25001"] {
            let p = params(&[("coordinates", "38.907,-77.037"), ("radius", radius)]);
            assert!(RadiusQuery::from_params(&p).is_err());
        }
        let p = params(&[("coordinates", "38.907,-77.037"), ("radius", "1000")]);
        assert_eq!(RadiusQuery::from_params(&p).unwrap().radius, Some(1000));
    }

    #[test]
    fn test_radius_lat_lon_and_sql() {
        let p = params(&[("coordinates", "38.907,-77.037"), ("radius", "1000")]);
        let q = RadiusQuery::from_params(&p).unwrap();
        assert_eq!(q.lat, Some(38.907));
        assert_eq!(q.lon, Some(-77.037));
        assert_eq!(
            q.fields().as_deref(),
            Some("ST_Distance(geog, ST_MakePoint(:lon, :lat)::geography) as distance")
        );
        assert_eq!(
            q.fields_for("geom").as_deref(),
            Some("ST_Distance(geom, ST_MakePoint(:lon, :lat)::geography) as distance")
        );
        assert_eq!(
            q.where_clause().as_deref(),
            Some("ST_DWithin(ST_MakePoint(:lon, :lat)::geography, geog, :radius)")
        );
        assert_eq!(
            q.clone().with_geometry_field("geom").where_clause().as_deref(),
            Some("ST_DWithin(ST_MakePoint(:lon, :lat)::geography, geom, :radius)")
        );
        assert_eq!(RadiusQuery::default().fields(), None);
        assert_eq!(RadiusQuery::default().where_clause(), None);
    }

    #[test]
    fn test_radius_with_bbox_rejected() {
        let p = params(&[
            ("bbox", "-77.0984,38.9021,-77.0390,38.9384"),
            ("coordinates", "38.9072,-77.0369"),
            ("radius", "10"),
        ]);
        assert!(RadiusQuery::from_params(&p).is_err());
    }

    #[test]
    fn test_bbox_has_value() {
        let q = BboxQuery::from_params(&params(&[("bbox", "-77.1234,38.7916,-76.9094,38.9955")])).unwrap();
        assert_eq!(
            q.where_clause().as_deref(),
            Some("ST_MakeEnvelope(:minx, :miny, :maxx, :maxy, 4326) && geom")
        );
        assert_eq!(q.minx, Some(-77.1234));
        assert_eq!(q.miny, Some(38.7916));
        assert_eq!(q.maxx, Some(-76.9094));
        assert_eq!(q.maxy, Some(38.9955));
        let b = bound(&q);
        assert_eq!(b.len(), 5);
        assert_eq!(b.get("maxy"), Some(&SqlValue::Float(38.9955)));
    }

    #[test]
    fn test_bbox_no_value() {
        let q = BboxQuery::from_params(&params(&[])).unwrap();
        assert_eq!(q.where_clause(), None);
        assert!(bound(&q).is_empty());
    }

    #[test]
    fn test_bbox_in_range() {
        for bbox in [
            "-181.0,38.7916,-76.9094,38.9955",
            "-179.0,91.7916,-76.9094,38.9955",
            "-179.0,38.7916,-181.9094,38.9955",
            "-179.0,38.7916,-76.9094,-90.9955",
            "-76.0,38.7916,-77.0,38.9955",
            "1,2,3",
        ] {
            assert!(BboxQuery::from_params(&params(&[("bbox", bbox)])).is_err(), "{}", bbox);
        }
    }

    #[test]
    fn test_paging_bounds() {
        let q = Paging::from_params(&params(&[("limit", "1000"), ("page", "42")])).unwrap();
        assert_eq!(q.offset(), 41000);
        assert_eq!(q.pagination().as_deref(), Some("LIMIT :limit OFFSET :offset"));
        let defaults = Paging::from_params(&params(&[])).unwrap();
        assert_eq!(defaults, Paging::default());
        let err = Paging::from_params(&params(&[("limit", "1001"), ("page", "0")])).unwrap_err();
        assert_eq!(err.len(), 2);
    }

    #[test]
    fn test_huge_page_offset_saturates() {
        let max = i64::MAX.to_string();
        let q = Paging::from_params(&params(&[("limit", "1000"), ("page", max.as_str())])).unwrap();
        assert_eq!(q.offset(), i64::MAX);
        assert_eq!(bound(&q).get("offset"), Some(&SqlValue::Int(i64::MAX)));

        assert_eq!(page_offset(1, 1000), 0);
        assert_eq!(page_offset(0, 100), 100);
        assert_eq!(page_offset(i64::MIN, 1000), i64::MAX);
    }

    #[test]
    fn test_temporal() {
        assert_eq!(TemporalQuery::from_params(&params(&[])).unwrap().temporal, PeriodName::Hour);
        let q = TemporalQuery::from_params(&params(&[("temporal", "dow")])).unwrap();
        assert_eq!(q.temporal, PeriodName::Dow);
        assert_eq!(q.where_clause(), None);
        assert_eq!(bound(&q).get("temporal"), Some(&SqlValue::Text("dow".into())));
        assert!(TemporalQuery::from_params(&params(&[("temporal", "week")])).is_err());
    }

    #[test]
    fn test_sorting() {
        let q = Sorting::<IdSort>::from_params(&params(&[])).unwrap();
        assert_eq!(q.order_by().as_deref(), Some("ORDER BY id ASC"));
        let q = Sorting::<IdSort>::from_params(&params(&[("sort_order", "desc")])).unwrap();
        assert_eq!(q.order_by().as_deref(), Some("ORDER BY id DESC"));
        assert!(Sorting::<IdSort>::from_params(&params(&[("order_by", "name; drop table")])).is_err());
    }

    #[test]
    fn test_period_name() {
        assert_eq!(
            PeriodNameQuery::from_params(&params(&[])).unwrap().period_name,
            PeriodName::Hour
        );
        assert_eq!(
            PeriodNameQuery::from_params(&params(&[("period_name", "moy")])).unwrap().period_name,
            PeriodName::Moy
        );
        assert!(PeriodNameQuery::from_params(&params(&[("period_name", "week")])).is_err());
    }

    #[test]
    fn test_path_id() {
        let q = PathIdQuery::new("locations_id", "id", 42).unwrap();
        assert_eq!(q.where_clause().as_deref(), Some("id = :locations_id"));
        assert_eq!(bound(&q).get("locations_id"), Some(&SqlValue::Int(42)));
        assert!(PathIdQuery::new("locations_id", "id", 0).is_err());

        let latest = PathIdQuery::new("parameters_id", "m.measurands_id", 42).unwrap();
        assert_eq!(latest.where_clause().as_deref(), Some("m.measurands_id = :parameters_id"));
    }
}
