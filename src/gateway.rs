//! CSV data gateway.
//!
//! Reads stores, suppliers, orders, vehicles and toll rates from CSV files
//! with a header row, and writes optimization results as two CSV sheets.
//! Column names are matched case-insensitively against a per-file alias
//! table, so exports that say `store_name` instead of `name` load the same.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{
    Location, ModelError, OptimizationResult, Order, PalletType, Store, Supplier, TollSegment,
    Vehicle,
};

#[derive(Debug, Error)]
pub enum MissingDataError {
    #[error("data file not found: {}", .0.display())]
    File(PathBuf),
    #[error("{file}: missing required column '{column}'")]
    Column { file: String, column: &'static str },
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Missing(#[from] MissingDataError),
    #[error("{file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },
    #[error("{file} row {row}: invalid {column} value '{value}'")]
    InvalidValue {
        file: String,
        row: usize,
        column: &'static str,
        value: String,
    },
    #[error("{file} row {row}: {source}")]
    Model {
        file: String,
        row: usize,
        #[source]
        source: ModelError,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A logical column and the header names that may carry it.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
    pub required: bool,
}

const fn required(canonical: &'static str, aliases: &'static [&'static str]) -> ColumnSpec {
    ColumnSpec {
        canonical,
        aliases,
        required: true,
    }
}

const fn optional(canonical: &'static str, aliases: &'static [&'static str]) -> ColumnSpec {
    ColumnSpec {
        canonical,
        aliases,
        required: false,
    }
}

pub const STORE_COLUMNS: &[ColumnSpec] = &[
    required("store_id", &[]),
    required("name", &["store_name"]),
    required("address", &[]),
    required("city", &[]),
    required("state", &[]),
    required("zip_code", &[]),
    required("latitude", &[]),
    required("longitude", &[]),
    required("demand_pallets", &[]),
    optional("priority", &[]),
    optional("contact_info", &[]),
    optional("delivery_window_start", &[]),
    optional("delivery_window_end", &[]),
];

pub const SUPPLIER_COLUMNS: &[ColumnSpec] = &[
    required("supplier_id", &[]),
    required("name", &["supplier_name"]),
    required("address", &[]),
    required("city", &[]),
    required("state", &[]),
    required("zip_code", &[]),
    required("latitude", &[]),
    required("longitude", &[]),
    required("available_pallets", &[]),
    required("cost_per_pallet", &[]),
    optional("contact_info", &[]),
    optional("lead_time_days", &[]),
    optional("capacity_per_day", &[]),
    optional("reliability_score", &[]),
    optional("pallet_types", &[]),
];

pub const ORDER_COLUMNS: &[ColumnSpec] = &[
    required("order_id", &[]),
    required("store_id", &[]),
    required("supplier_id", &[]),
    required("quantity", &["pallets_ordered"]),
    optional("requested_date", &["date"]),
    optional("priority", &["order_priority"]),
    optional("pallet_type", &[]),
    optional("special_instructions", &[]),
];

pub const VEHICLE_COLUMNS: &[ColumnSpec] = &[
    required("vehicle_id", &[]),
    optional("vehicle_type", &["type"]),
    required("max_pallets", &[]),
    optional("max_weight", &[]),
    required("cost_per_mile", &[]),
    required("cost_per_hour", &[]),
    optional("available", &[]),
];

const TOLL_COLUMNS: &[ColumnSpec] = &[
    required("from_location", &[]),
    required("to_location", &[]),
    required("rate_per_mile", &["toll_rate_per_mile"]),
    optional("flat_rate", &[]),
];

const LEGACY_TOLL_COLUMNS: &[ColumnSpec] = &[
    required("route_segment", &[]),
    required("rate_per_mile", &["toll_rate_per_mile"]),
    optional("flat_rate", &[]),
];

/// Canonical column name to field index, resolved once per file.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    file: String,
    indices: HashMap<&'static str, usize>,
}

impl ColumnMap {
    pub fn resolve(
        file: &str,
        headers: &StringRecord,
        specs: &[ColumnSpec],
    ) -> Result<Self, MissingDataError> {
        let normalized: Vec<String> = headers
            .iter()
            .map(|header| header.trim().to_ascii_lowercase())
            .collect();

        let mut indices = HashMap::new();
        for spec in specs {
            let found = std::iter::once(spec.canonical)
                .chain(spec.aliases.iter().copied())
                .find_map(|name| normalized.iter().position(|header| header == name));
            match found {
                Some(index) => {
                    indices.insert(spec.canonical, index);
                }
                None if spec.required => {
                    return Err(MissingDataError::Column {
                        file: file.to_string(),
                        column: spec.canonical,
                    });
                }
                None => {}
            }
        }

        Ok(Self {
            file: file.to_string(),
            indices,
        })
    }

    pub fn has(&self, canonical: &str) -> bool {
        self.indices.contains_key(canonical)
    }

    fn row<'a>(&'a self, record: &'a StringRecord, row: usize) -> Row<'a> {
        Row {
            columns: self,
            record,
            row,
        }
    }
}

/// One data record viewed through a [`ColumnMap`].
struct Row<'a> {
    columns: &'a ColumnMap,
    record: &'a StringRecord,
    row: usize,
}

impl Row<'_> {
    /// Trimmed cell text; `None` when the column is absent or the cell empty.
    fn text(&self, column: &str) -> Option<&str> {
        let index = *self.columns.indices.get(column)?;
        let value = self.record.get(index)?.trim();
        (!value.is_empty()).then_some(value)
    }

    fn owned(&self, column: &str) -> String {
        self.text(column).unwrap_or_default().to_string()
    }

    fn invalid(&self, column: &'static str, value: &str) -> GatewayError {
        GatewayError::InvalidValue {
            file: self.columns.file.clone(),
            row: self.row,
            column,
            value: value.to_string(),
        }
    }

    fn model(&self, source: ModelError) -> GatewayError {
        GatewayError::Model {
            file: self.columns.file.clone(),
            row: self.row,
            source,
        }
    }

    fn required_text(&self, column: &'static str) -> Result<&str, GatewayError> {
        self.text(column).ok_or_else(|| self.invalid(column, ""))
    }

    fn parse<T: FromStr>(&self, column: &'static str) -> Result<Option<T>, GatewayError> {
        self.text(column)
            .map(|value| value.parse().map_err(|_| self.invalid(column, value)))
            .transpose()
    }

    fn required<T: FromStr>(&self, column: &'static str) -> Result<T, GatewayError> {
        self.parse(column)?.ok_or_else(|| self.invalid(column, ""))
    }

    /// Whole numbers, also when spreadsheet exports write them as `12.0`.
    fn count(&self, column: &'static str) -> Result<Option<u32>, GatewayError> {
        let Some(value) = self.text(column) else {
            return Ok(None);
        };
        if let Ok(count) = value.parse::<u32>() {
            return Ok(Some(count));
        }
        match value.parse::<f64>() {
            Ok(number) if number >= 0.0 && number.fract() == 0.0 && number <= u32::MAX as f64 => {
                Ok(Some(number as u32))
            }
            _ => Err(self.invalid(column, value)),
        }
    }

    fn required_count(&self, column: &'static str) -> Result<u32, GatewayError> {
        self.count(column)?.ok_or_else(|| self.invalid(column, ""))
    }

    /// Numeric priority or High/Medium/Low; anything else is priority 1.
    fn priority(&self, column: &'static str) -> u32 {
        match self.text(column) {
            None => 1,
            Some(value) => parse_priority(value),
        }
    }

    fn datetime(&self, column: &'static str) -> Result<Option<NaiveDateTime>, GatewayError> {
        self.text(column)
            .map(|value| parse_datetime(value).ok_or_else(|| self.invalid(column, value)))
            .transpose()
    }

    fn date(&self, column: &'static str) -> Result<Option<NaiveDate>, GatewayError> {
        self.text(column)
            .map(|value| {
                NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .ok()
                    .or_else(|| parse_datetime(value).map(|dt| dt.date()))
                    .ok_or_else(|| self.invalid(column, value))
            })
            .transpose()
    }

    fn flag(&self, column: &'static str) -> Result<Option<bool>, GatewayError> {
        self.text(column)
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Ok(true),
                "false" | "no" | "n" | "0" => Ok(false),
                _ => Err(self.invalid(column, value)),
            })
            .transpose()
    }

    fn location(&self) -> Result<Location, GatewayError> {
        let lat = self.required("latitude")?;
        let lon = self.required("longitude")?;
        let mut location = Location::new(self.owned("name"), lat, lon)
            .map_err(|err| self.model(err))?
            .with_address(
                self.owned("address"),
                self.owned("city"),
                self.owned("state"),
                self.owned("zip_code"),
            );
        location.contact_info = self.text("contact_info").map(str::to_string);
        Ok(location)
    }
}

fn parse_priority(value: &str) -> u32 {
    match value.to_ascii_lowercase().as_str() {
        "high" => 1,
        "medium" => 2,
        "low" => 3,
        other => other
            .parse::<f64>()
            .ok()
            .filter(|number| *number >= 1.0)
            .map_or(1, |number| number as u32),
    }
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

/// Every pallet type named anywhere in `value`; standard when none is.
fn parse_pallet_types(value: Option<&str>) -> Vec<PalletType> {
    let text = value.unwrap_or_default().to_ascii_lowercase();
    let types: Vec<PalletType> = [
        ("standard", PalletType::Standard),
        ("euro", PalletType::Euro),
        ("custom", PalletType::Custom),
    ]
    .into_iter()
    .filter(|(name, _)| text.contains(name))
    .map(|(_, kind)| kind)
    .collect();

    if types.is_empty() {
        vec![PalletType::Standard]
    } else {
        types
    }
}

/// Reads all records of `reader`, mapping each through `parse`.
fn read_records<R, T, F>(
    reader: R,
    file: &str,
    specs: &[ColumnSpec],
    parse: F,
) -> Result<Vec<T>, GatewayError>
where
    R: io::Read,
    F: FnMut(&Row<'_>) -> Result<T, GatewayError>,
{
    read_records_with(reader, file, |_| specs, parse)
}

/// Like [`read_records`], with the column table chosen from the header row.
fn read_records_with<'s, R, T, S, F>(
    reader: R,
    file: &str,
    select: S,
    mut parse: F,
) -> Result<Vec<T>, GatewayError>
where
    R: io::Read,
    S: FnOnce(&StringRecord) -> &'s [ColumnSpec],
    F: FnMut(&Row<'_>) -> Result<T, GatewayError>,
{
    let csv_error = |source| GatewayError::Csv {
        file: file.to_string(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers().map_err(csv_error)?.clone();
    let columns = ColumnMap::resolve(file, &headers, select(&headers))?;

    let mut items = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(csv_error)?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        // Header is row 1.
        items.push(parse(&columns.row(&record, index + 2))?);
    }
    debug!(file, records = items.len(), "loaded records");
    Ok(items)
}

pub fn read_stores<R: io::Read>(reader: R, file: &str) -> Result<Vec<Store>, GatewayError> {
    read_records(reader, file, STORE_COLUMNS, |row| {
        let location = row.location()?;
        let mut store = Store::new(
            row.required_text("store_id")?,
            location,
            row.required_count("demand_pallets")?,
        )
        .map_err(|err| row.model(err))?
        .with_priority(row.priority("priority"));
        store.delivery_window_start = row.datetime("delivery_window_start")?;
        store.delivery_window_end = row.datetime("delivery_window_end")?;
        Ok(store)
    })
}

pub fn read_suppliers<R: io::Read>(reader: R, file: &str) -> Result<Vec<Supplier>, GatewayError> {
    read_records(reader, file, SUPPLIER_COLUMNS, |row| {
        let location = row.location()?;
        let mut supplier = Supplier::new(
            row.required_text("supplier_id")?,
            location,
            row.required_count("available_pallets")?,
            row.required("cost_per_pallet")?,
        )
        .with_reliability(row.parse("reliability_score")?.unwrap_or(1.0))
        .map_err(|err| row.model(err))?;
        supplier.lead_time_days = row.count("lead_time_days")?.unwrap_or(1);
        supplier.capacity_per_day = row.count("capacity_per_day")?.unwrap_or(100);
        supplier.pallet_types = parse_pallet_types(row.text("pallet_types"));
        Ok(supplier)
    })
}

pub fn read_orders<R: io::Read>(reader: R, file: &str) -> Result<Vec<Order>, GatewayError> {
    read_records(reader, file, ORDER_COLUMNS, |row| {
        let id = row.required_text("order_id")?.to_string();
        let quantity = row.count("quantity")?.unwrap_or(0);
        if quantity == 0 {
            return Err(row.model(ModelError::ZeroQuantity(id)));
        }
        let pallet_type = match row.text("pallet_type") {
            Some(value) => {
                PalletType::parse(value).ok_or_else(|| row.invalid("pallet_type", value))?
            }
            None => PalletType::Standard,
        };
        Ok(Order {
            store_id: row.required_text("store_id")?.to_string(),
            supplier_id: row.required_text("supplier_id")?.to_string(),
            id,
            quantity,
            pallet_type,
            requested_date: row.date("requested_date")?,
            priority: row.priority("priority"),
            special_instructions: row.text("special_instructions").map(str::to_string),
        })
    })
}

pub fn read_vehicles<R: io::Read>(reader: R, file: &str) -> Result<Vec<Vehicle>, GatewayError> {
    read_records(reader, file, VEHICLE_COLUMNS, |row| {
        let mut vehicle = Vehicle::new(
            row.required_text("vehicle_id")?,
            row.required_count("max_pallets")?,
            row.required("cost_per_mile")?,
            row.required("cost_per_hour")?,
        )
        .map_err(|err| row.model(err))?;
        if let Some(kind) = row.text("vehicle_type") {
            vehicle.vehicle_type = kind.to_string();
        }
        vehicle.max_weight = row.count("max_weight")?.unwrap_or(0);
        vehicle.available = row.flag("available")?.unwrap_or(true);
        Ok(vehicle)
    })
}

/// Reads toll segments in either the `from_location, to_location` layout or
/// the legacy `route_segment` layout, picked from the header row.
pub fn read_toll_rates<R: io::Read>(
    reader: R,
    file: &str,
) -> Result<Vec<TollSegment>, GatewayError> {
    let select = |headers: &StringRecord| {
        let has = |name: &str| {
            headers
                .iter()
                .any(|header| header.trim().eq_ignore_ascii_case(name))
        };
        if !(has("from_location") && has("to_location")) && has("route_segment") {
            LEGACY_TOLL_COLUMNS
        } else {
            TOLL_COLUMNS
        }
    };

    read_records_with(reader, file, select, |row| {
        let rate = row.required("rate_per_mile")?;
        let (from, to) = if row.columns.has("route_segment") {
            split_route_segment(row.required_text("route_segment")?)
        } else {
            (
                row.required_text("from_location")?.to_string(),
                row.required_text("to_location")?.to_string(),
            )
        };
        let mut segment = TollSegment::new(from, to, rate).map_err(|err| row.model(err))?;
        segment.flat_rate = row.parse("flat_rate")?;
        Ok(segment)
    })
}

/// `"Chicago to Milwaukee"` becomes `("Chicago", "Milwaukee")`. A segment
/// without exactly one `" to "` is kept as a self-loop on the whole text.
fn split_route_segment(segment: &str) -> (String, String) {
    let parts: Vec<&str> = segment.split(" to ").collect();
    if let [from, to] = parts.as_slice() {
        return (from.trim().to_string(), to.trim().to_string());
    }
    warn!(segment, "route segment has no single ' to ', keyed as a self-loop");
    (segment.to_string(), segment.to_string())
}

fn open(path: &Path) -> Result<File, GatewayError> {
    if !path.exists() {
        return Err(MissingDataError::File(path.to_path_buf()).into());
    }
    Ok(File::open(path)?)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn load_stores(path: impl AsRef<Path>) -> Result<Vec<Store>, GatewayError> {
    let path = path.as_ref();
    read_stores(open(path)?, &file_label(path))
}

pub fn load_suppliers(path: impl AsRef<Path>) -> Result<Vec<Supplier>, GatewayError> {
    let path = path.as_ref();
    read_suppliers(open(path)?, &file_label(path))
}

pub fn load_vehicles(path: impl AsRef<Path>) -> Result<Vec<Vehicle>, GatewayError> {
    let path = path.as_ref();
    read_vehicles(open(path)?, &file_label(path))
}

/// Orders are optional: a missing file yields no orders.
pub fn load_orders(path: impl AsRef<Path>) -> Result<Vec<Order>, GatewayError> {
    let path = path.as_ref();
    if !path.exists() {
        info!(path = %path.display(), "no order history file");
        return Ok(Vec::new());
    }
    read_orders(File::open(path)?, &file_label(path))
}

/// Toll rates are optional: a missing file yields no segments.
pub fn load_toll_rates(path: impl AsRef<Path>) -> Result<Vec<TollSegment>, GatewayError> {
    let path = path.as_ref();
    if !path.exists() {
        info!(path = %path.display(), "no toll rate file");
        return Ok(Vec::new());
    }
    read_toll_rates(File::open(path)?, &file_label(path))
}

/// Writes `<stem>_summary.csv` and `<stem>_routes.csv` into `dir`, creating
/// it when needed. Returns both paths.
pub fn write_results(
    result: &OptimizationResult,
    dir: impl AsRef<Path>,
    stem: &str,
) -> Result<(PathBuf, PathBuf), GatewayError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let summary_path = dir.join(format!("{stem}_summary.csv"));
    let routes_path = dir.join(format!("{stem}_routes.csv"));
    let csv_error = |path: &Path| {
        let file = file_label(path);
        move |source| GatewayError::Csv { file, source }
    };

    let mut summary = csv::Writer::from_path(&summary_path).map_err(csv_error(&summary_path))?;
    let unassigned = if result.unassigned_stores.is_empty() {
        "none".to_string()
    } else {
        result.unassigned_stores.join(", ")
    };
    let rows = [
        ("Total Cost", format!("${:.2}", result.total_cost)),
        ("Total Distance", format!("{:.1} miles", result.total_distance)),
        ("Total Time", format!("{:.1} hours", result.total_time)),
        ("Number of Routes", result.routes.len().to_string()),
        ("Utilization Rate", format!("{:.1}%", result.utilization_rate * 100.0)),
        ("Solver Status", result.solver_status.to_string()),
        ("Solve Time", format!("{:.2} seconds", result.solve_time)),
        ("Objective Value", format!("{:.2}", result.objective_value)),
        ("Unassigned Stores", unassigned),
    ];
    summary
        .write_record(["Metric", "Value"])
        .map_err(csv_error(&summary_path))?;
    for (metric, value) in &rows {
        summary
            .write_record([*metric, value.as_str()])
            .map_err(csv_error(&summary_path))?;
    }
    summary.flush()?;

    let mut routes = csv::Writer::from_path(&routes_path).map_err(csv_error(&routes_path))?;
    routes
        .write_record([
            "Route ID",
            "Vehicle ID",
            "Stops",
            "Distance (miles)",
            "Time (hours)",
            "Cost",
            "Pallets",
            "Status",
        ])
        .map_err(csv_error(&routes_path))?;
    for route in &result.routes {
        routes
            .write_record([
                route.id.clone(),
                route.vehicle_id.clone(),
                route.stops.join(" -> "),
                format!("{:.2}", route.total_distance),
                format!("{:.2}", route.total_time),
                format!("{:.2}", route.total_cost),
                route.pallets_delivered.to_string(),
                route.status.to_string(),
            ])
            .map_err(csv_error(&routes_path))?;
    }
    routes.flush()?;

    info!(
        summary = %summary_path.display(),
        routes = %routes_path.display(),
        "wrote optimization results"
    );
    Ok((summary_path, routes_path))
}

/// Writes example store and supplier input files into `dir`.
pub fn write_templates(dir: impl AsRef<Path>) -> Result<(PathBuf, PathBuf), GatewayError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let stores_path = dir.join("store_input_template.csv");
    let suppliers_path = dir.join("supplier_input_template.csv");

    fs::write(
        &stores_path,
        concat!(
            "store_id,name,address,city,state,zip_code,latitude,longitude,",
            "demand_pallets,priority,contact_info\n",
            "STORE_001,Store A,123 Main St,Chicago,IL,60601,41.8781,-87.6298,",
            "25,1,manager@storea.com\n",
            "STORE_002,Store B,456 Oak Ave,Milwaukee,WI,53202,43.0389,-87.9065,",
            "15,2,contact@storeb.com\n",
        ),
    )?;
    fs::write(
        &suppliers_path,
        concat!(
            "supplier_id,name,address,city,state,zip_code,latitude,longitude,",
            "available_pallets,cost_per_pallet,lead_time_days,capacity_per_day,",
            "reliability_score,pallet_types\n",
            "SUP_001,Supplier Alpha,789 Industrial Blvd,Chicago,IL,60610,41.8902,-87.6511,",
            "100,45.50,1,50,0.95,\"standard,euro\"\n",
            "SUP_002,Supplier Beta,321 Commerce Dr,Milwaukee,WI,53210,43.0642,-87.9073,",
            "75,42.00,2,40,0.98,standard\n",
        ),
    )?;
    Ok((stores_path, suppliers_path))
}

/// File-name conventions for one input directory.
#[derive(Debug, Clone)]
pub struct DataGateway {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl DataGateway {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn stores(&self) -> Result<Vec<Store>, GatewayError> {
        load_stores(self.input_dir.join("store_locations.csv"))
    }

    pub fn suppliers(&self) -> Result<Vec<Supplier>, GatewayError> {
        load_suppliers(self.input_dir.join("supplier_data.csv"))
    }

    pub fn vehicles(&self) -> Result<Vec<Vehicle>, GatewayError> {
        load_vehicles(self.input_dir.join("vehicles.csv"))
    }

    pub fn orders(&self) -> Result<Vec<Order>, GatewayError> {
        load_orders(self.input_dir.join("historical_orders.csv"))
    }

    pub fn toll_rates(&self) -> Result<Vec<TollSegment>, GatewayError> {
        load_toll_rates(self.input_dir.join("toll_rates.csv"))
    }

    /// Writes results under a timestamped stem.
    pub fn save_results(
        &self,
        result: &OptimizationResult,
    ) -> Result<(PathBuf, PathBuf), GatewayError> {
        let stem = format!(
            "optimization_results_{}",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        write_results(result, &self.output_dir, &stem)
    }
}
