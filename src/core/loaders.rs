//! Point cloud containers and tile readers.
//!
//! This module provides:
//! - `PointCloud`, a struct-of-arrays container with named extra fields
//! - The `PointCloudReader` trait used by the tile index and stitcher
//! - Readers for LAS tiles (`LasReader`) and Cartesian CSV tiles (`CsvReader`)
//! - Recursive, extension-filtered tile discovery

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use las::Read as _;
use thiserror::Error;
use walkdir::WalkDir;

use super::geometry::BoundingBox;

/// Errors that can occur while reading tiles.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("LAS error: {0}")]
    Las(#[from] las::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error in {path} at record {record}: {message}")]
    ParseError {
        path: PathBuf,
        record: usize,
        message: String,
    },

    #[error("Field '{name}' has {actual} values, cloud has {expected} points")]
    FieldLength {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Axis-aligned 3D extents of a tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extents {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Extents {
    /// Planimetric (x/y) footprint of the extents.
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.min[0], self.max[0], self.min[1], self.max[1])
    }

    fn include(&mut self, x: f64, y: f64, z: f64) {
        for (axis, v) in [x, y, z].into_iter().enumerate() {
            if v < self.min[axis] {
                self.min[axis] = v;
            }
            if v > self.max[axis] {
                self.max[axis] = v;
            }
        }
    }

    fn seed(x: f64, y: f64, z: f64) -> Self {
        Self {
            min: [x, y, z],
            max: [x, y, z],
        }
    }
}

/// Container for 3D point cloud data.
///
/// Coordinates are stored as `f64` so projected (UTM) coordinates keep
/// centimetre precision. Additional per-point attributes such as `intensity`
/// live in `fields`, each with exactly one value per point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    /// X coordinates of all points.
    pub x: Vec<f64>,
    /// Y coordinates of all points.
    pub y: Vec<f64>,
    /// Z coordinates of all points.
    pub z: Vec<f64>,
    fields: BTreeMap<String, Vec<f64>>,
}

impl PointCloud {
    /// Creates a new empty point cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            fields: BTreeMap::new(),
        }
    }

    /// Creates a new point cloud from coordinate vectors.
    pub fn from_xyz(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Self {
        Self {
            x,
            y,
            z,
            fields: BTreeMap::new(),
        }
    }

    /// Returns the number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Adds a point to the cloud.
    ///
    /// Extra fields are padded with NaN so every field keeps one value per point.
    #[inline]
    pub fn push(&mut self, x: f64, y: f64, z: f64) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
        for values in self.fields.values_mut() {
            values.push(f64::NAN);
        }
    }

    /// Attaches a named per-point field, replacing any existing one.
    pub fn insert_field(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.len() {
            return Err(LoaderError::FieldLength {
                name,
                expected: self.len(),
                actual: values.len(),
            });
        }
        self.fields.insert(name, values);
        Ok(())
    }

    /// Values of a field by name. `x`, `y` and `z` are always available.
    pub fn field(&self, name: &str) -> Option<&[f64]> {
        match name {
            "x" => Some(&self.x),
            "y" => Some(&self.y),
            "z" => Some(&self.z),
            other => self.fields.get(other).map(Vec::as_slice),
        }
    }

    /// Names of all fields, coordinates first.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names = vec!["x", "y", "z"];
        names.extend(self.fields.keys().map(String::as_str));
        names
    }

    /// Computes the 3D extents, or `None` for an empty cloud.
    pub fn extents(&self) -> Option<Extents> {
        let mut extents: Option<Extents> = None;
        for i in 0..self.len() {
            let (x, y, z) = (self.x[i], self.y[i], self.z[i]);
            match extents.as_mut() {
                Some(e) => e.include(x, y, z),
                None => extents = Some(Extents::seed(x, y, z)),
            }
        }
        extents
    }

    /// Appends all points of `other`.
    ///
    /// The resulting field set is the union of both clouds; values missing
    /// on either side are filled with NaN.
    pub fn append(&mut self, other: &PointCloud) {
        let before = self.len();
        let added = other.len();

        for (name, values) in &other.fields {
            self.fields
                .entry(name.clone())
                .or_insert_with(|| vec![f64::NAN; before])
                .extend_from_slice(values);
        }
        for (name, values) in self.fields.iter_mut() {
            if !other.fields.contains_key(name) {
                values.resize(before + added, f64::NAN);
            }
        }

        self.x.extend_from_slice(&other.x);
        self.y.extend_from_slice(&other.y);
        self.z.extend_from_slice(&other.z);
    }

    /// Returns a new cloud holding only the points inside `bbox` (x/y only).
    pub fn crop_xy(&self, bbox: &BoundingBox) -> PointCloud {
        let keep: Vec<usize> = (0..self.len())
            .filter(|&i| bbox.contains_xy(self.x[i], self.y[i]))
            .collect();

        let pick = |values: &[f64]| keep.iter().map(|&i| values[i]).collect::<Vec<f64>>();

        PointCloud {
            x: pick(&self.x),
            y: pick(&self.y),
            z: pick(&self.z),
            fields: self
                .fields
                .iter()
                .map(|(name, values)| (name.clone(), pick(values)))
                .collect(),
        }
    }
}

/// Source of tile extents and points.
///
/// Implementations must be shareable across worker threads; the tile index
/// reads extents for many tiles concurrently.
pub trait PointCloudReader: Send + Sync {
    /// File extensions (without the dot) this reader accepts.
    fn extensions(&self) -> &[&str];

    /// Reads the 3D extents of a tile, from the header where the format has one.
    fn read_extents(&self, path: &Path) -> Result<Extents>;

    /// Loads every point of a tile.
    fn read_points(&self, path: &Path) -> Result<PointCloud>;
}

/// Reader for ASPRS LAS tiles.
///
/// Extents come straight from the header bounds, so indexing a collection
/// never touches point records.
#[derive(Debug, Clone, Copy, Default)]
pub struct LasReader;

impl PointCloudReader for LasReader {
    fn extensions(&self) -> &[&str] {
        &["las"]
    }

    fn read_extents(&self, path: &Path) -> Result<Extents> {
        let reader = las::Reader::from_path(path)?;
        let bounds = reader.header().bounds();
        Ok(Extents {
            min: [bounds.min.x, bounds.min.y, bounds.min.z],
            max: [bounds.max.x, bounds.max.y, bounds.max.z],
        })
    }

    fn read_points(&self, path: &Path) -> Result<PointCloud> {
        let mut reader = las::Reader::from_path(path)?;
        let capacity = reader.header().number_of_points() as usize;

        let mut cloud = PointCloud::with_capacity(capacity);
        let mut intensity = Vec::with_capacity(capacity);
        let mut return_number = Vec::with_capacity(capacity);
        let mut number_of_returns = Vec::with_capacity(capacity);
        let mut classification = Vec::with_capacity(capacity);
        let mut gps_time = Vec::with_capacity(capacity);

        for point in reader.points() {
            let point = point?;
            cloud.push(point.x, point.y, point.z);
            intensity.push(f64::from(point.intensity));
            return_number.push(f64::from(point.return_number));
            number_of_returns.push(f64::from(point.number_of_returns));
            classification.push(f64::from(u8::from(point.classification)));
            gps_time.push(point.gps_time.unwrap_or(f64::NAN));
        }

        cloud.insert_field("intensity", intensity)?;
        cloud.insert_field("return_number", return_number)?;
        cloud.insert_field("number_of_returns", number_of_returns)?;
        cloud.insert_field("classification", classification)?;
        if gps_time.iter().any(|t| !t.is_nan()) {
            cloud.insert_field("gps_time", gps_time)?;
        }

        Ok(cloud)
    }
}

/// Reader for Cartesian CSV tiles with an `x,y,z` header.
///
/// Every other column is loaded as a numeric extra field. CSV has no header
/// extents, so `read_extents` scans the coordinate columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReader;

struct CsvColumns {
    x: usize,
    y: usize,
    z: usize,
    extra: Vec<(usize, String)>,
}

impl CsvReader {
    fn open(path: &Path) -> Result<(csv::Reader<BufReader<File>>, CsvColumns)> {
        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(BufReader::with_capacity(64 * 1024, file));

        let headers = reader.headers()?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| LoaderError::MissingColumns(format!("{} in {}", name, path.display())))
        };

        let (x, y, z) = (position("x")?, position("y")?, position("z")?);
        let extra = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| ![x, y, z].contains(i))
            .map(|(i, name)| (i, name.to_lowercase()))
            .collect();

        Ok((reader, CsvColumns { x, y, z, extra }))
    }

    fn parse(path: &Path, record: &csv::StringRecord, row: usize, column: usize) -> Result<f64> {
        let raw = record.get(column).unwrap_or_default();
        raw.parse::<f64>().map_err(|e| LoaderError::ParseError {
            path: path.to_path_buf(),
            record: row,
            message: format!("column {}: '{}' ({})", column, raw, e),
        })
    }
}

impl PointCloudReader for CsvReader {
    fn extensions(&self) -> &[&str] {
        &["csv"]
    }

    fn read_extents(&self, path: &Path) -> Result<Extents> {
        let (mut reader, cols) = Self::open(path)?;
        let mut extents: Option<Extents> = None;

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let x = Self::parse(path, &record, row, cols.x)?;
            let y = Self::parse(path, &record, row, cols.y)?;
            let z = Self::parse(path, &record, row, cols.z)?;
            match extents.as_mut() {
                Some(e) => e.include(x, y, z),
                None => extents = Some(Extents::seed(x, y, z)),
            }
        }

        extents.ok_or_else(|| LoaderError::EmptyFile(path.to_path_buf()))
    }

    fn read_points(&self, path: &Path) -> Result<PointCloud> {
        let (mut reader, cols) = Self::open(path)?;
        let mut cloud = PointCloud::with_capacity(10_000);
        let mut extra: Vec<Vec<f64>> = vec![Vec::new(); cols.extra.len()];

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            cloud.x.push(Self::parse(path, &record, row, cols.x)?);
            cloud.y.push(Self::parse(path, &record, row, cols.y)?);
            cloud.z.push(Self::parse(path, &record, row, cols.z)?);
            for (values, (column, _)) in extra.iter_mut().zip(&cols.extra) {
                values.push(Self::parse(path, &record, row, *column)?);
            }
        }

        for (values, (_, name)) in extra.into_iter().zip(cols.extra) {
            cloud.insert_field(name, values)?;
        }

        Ok(cloud)
    }
}

/// A reader picked at runtime, from configuration or a file extension.
#[derive(Debug, Clone, Copy)]
pub enum AnyReader {
    Las(LasReader),
    Csv(CsvReader),
}

impl AnyReader {
    /// Reader whose extensions match `path`, if any.
    pub fn for_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        [AnyReader::Las(LasReader), AnyReader::Csv(CsvReader)]
            .into_iter()
            .find(|reader| reader.extensions().contains(&ext.as_str()))
    }
}

impl PointCloudReader for AnyReader {
    fn extensions(&self) -> &[&str] {
        match self {
            AnyReader::Las(reader) => reader.extensions(),
            AnyReader::Csv(reader) => reader.extensions(),
        }
    }

    fn read_extents(&self, path: &Path) -> Result<Extents> {
        match self {
            AnyReader::Las(reader) => reader.read_extents(path),
            AnyReader::Csv(reader) => reader.read_extents(path),
        }
    }

    fn read_points(&self, path: &Path) -> Result<PointCloud> {
        match self {
            AnyReader::Las(reader) => reader.read_points(path),
            AnyReader::Csv(reader) => reader.read_points(path),
        }
    }
}

/// Recursively discover point cloud files under `directory`.
///
/// Entries are sorted by file name within each directory and visited
/// depth-first, so the result order is stable between runs. Extensions match
/// case-insensitively. Directory symlinks are not followed; symlinks to
/// files are listed like regular files.
pub fn find_point_files(directory: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    for entry in WalkDir::new(directory).sort_by_file_name() {
        let entry = entry?;
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink() && entry.path().is_file());
        if is_file && has_extension(entry.path(), extensions) {
            found.push(entry.into_path());
        }
    }

    Ok(found)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_csv(path: &Path, rows: &[(f64, f64, f64, f64)]) {
        let mut file = File::create(path).unwrap();
        writeln!(file, "x,y,z,intensity").unwrap();
        for (x, y, z, i) in rows {
            writeln!(file, "{},{},{},{}", x, y, z, i).unwrap();
        }
    }

    #[test]
    fn test_point_cloud_basics() {
        let mut cloud = PointCloud::new();
        assert!(cloud.is_empty());
        assert!(cloud.extents().is_none());

        cloud.push(1.0, 2.0, 3.0);
        cloud.push(-1.0, 5.0, 0.5);

        assert_eq!(cloud.len(), 2);
        let extents = cloud.extents().unwrap();
        assert_eq!(extents.min, [-1.0, 2.0, 0.5]);
        assert_eq!(extents.max, [1.0, 5.0, 3.0]);
    }

    #[test]
    fn test_insert_field_length_checked() {
        let mut cloud = PointCloud::from_xyz(vec![0.0, 1.0], vec![0.0, 1.0], vec![0.0, 1.0]);
        assert!(cloud.insert_field("intensity", vec![1.0]).is_err());
        cloud.insert_field("intensity", vec![10.0, 20.0]).unwrap();
        assert_eq!(cloud.field("intensity"), Some(&[10.0, 20.0][..]));
        assert_eq!(cloud.field("z"), Some(&[0.0, 1.0][..]));
        assert_eq!(cloud.field("missing"), None);
        assert_eq!(cloud.field_names(), vec!["x", "y", "z", "intensity"]);
    }

    #[test]
    fn test_append_fills_missing_fields() {
        let mut a = PointCloud::from_xyz(vec![0.0], vec![0.0], vec![1.0]);
        a.insert_field("intensity", vec![7.0]).unwrap();
        let b = PointCloud::from_xyz(vec![5.0, 6.0], vec![5.0, 6.0], vec![2.0, 3.0]);

        a.append(&b);

        assert_eq!(a.len(), 3);
        assert_eq!(a.z, vec![1.0, 2.0, 3.0]);
        let intensity = a.field("intensity").unwrap();
        assert_eq!(intensity[0], 7.0);
        assert!(intensity[1].is_nan());
        assert!(intensity[2].is_nan());
    }

    #[test]
    fn test_append_adds_new_fields() {
        let mut a = PointCloud::from_xyz(vec![0.0], vec![0.0], vec![1.0]);
        let mut b = PointCloud::from_xyz(vec![1.0], vec![1.0], vec![2.0]);
        b.insert_field("intensity", vec![3.0]).unwrap();

        a.append(&b);

        let intensity = a.field("intensity").unwrap();
        assert!(intensity[0].is_nan());
        assert_eq!(intensity[1], 3.0);
    }

    #[test]
    fn test_crop_xy() {
        let mut cloud = PointCloud::from_xyz(vec![0.5, 5.0, 1.0], vec![0.5, 5.0, 1.0], vec![1.0, 2.0, 3.0]);
        cloud.insert_field("intensity", vec![1.0, 2.0, 3.0]).unwrap();

        let cropped = cloud.crop_xy(&BoundingBox::new(0.0, 1.0, 0.0, 1.0));

        assert_eq!(cropped.len(), 2);
        assert_eq!(cropped.z, vec![1.0, 3.0]);
        assert_eq!(cropped.field("intensity"), Some(&[1.0, 3.0][..]));
    }

    #[test]
    fn test_csv_reader_extents_and_points() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tile.csv");
        write_csv(&path, &[(1.0, 2.0, 3.0, 10.0), (4.0, -1.0, 9.0, 20.0)]);

        let extents = CsvReader.read_extents(&path).unwrap();
        assert_eq!(extents.min, [1.0, -1.0, 3.0]);
        assert_eq!(extents.max, [4.0, 2.0, 9.0]);
        assert_eq!(extents.bbox(), BoundingBox::new(1.0, 4.0, -1.0, 2.0));

        let cloud = CsvReader.read_points(&path).unwrap();
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.field("intensity"), Some(&[10.0, 20.0][..]));
    }

    #[test]
    fn test_csv_reader_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.csv");
        write_csv(&path, &[]);

        let result = CsvReader.read_extents(&path);
        assert!(matches!(result, Err(LoaderError::EmptyFile(_))));
    }

    #[test]
    fn test_csv_reader_missing_columns() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "a,b,c").unwrap();
        writeln!(file, "1,2,3").unwrap();

        let result = CsvReader.read_points(&path);
        assert!(matches!(result, Err(LoaderError::MissingColumns(_))));
    }

    #[test]
    fn test_csv_reader_parse_error_names_record() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "x,y,z").unwrap();
        writeln!(file, "1,2,3").unwrap();
        writeln!(file, "1,oops,3").unwrap();

        match CsvReader.read_points(&path) {
            Err(LoaderError::ParseError { record, .. }) => assert_eq!(record, 1),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_find_point_files_recursive_and_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("b_dir");
        fs::create_dir_all(&nested).unwrap();

        File::create(temp_dir.path().join("c.csv")).unwrap();
        File::create(temp_dir.path().join("a.CSV")).unwrap();
        File::create(temp_dir.path().join("notes.txt")).unwrap();
        File::create(nested.join("inner.csv")).unwrap();

        let files = find_point_files(temp_dir.path(), &["csv"]).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(temp_dir.path()).unwrap().display().to_string())
            .collect();

        assert_eq!(names, vec!["a.CSV", "b_dir/inner.csv", "c.csv"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_find_point_files_ignores_directory_symlink_cycle() {
        let temp_dir = TempDir::new().unwrap();
        File::create(temp_dir.path().join("a.csv")).unwrap();
        std::os::unix::fs::symlink(temp_dir.path(), temp_dir.path().join("loop")).unwrap();

        let files = find_point_files(temp_dir.path(), &["csv"]).unwrap();
        assert_eq!(files, vec![temp_dir.path().join("a.csv")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_find_point_files_lists_file_symlinks() {
        let temp_dir = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        File::create(data.path().join("real.csv")).unwrap();
        std::os::unix::fs::symlink(data.path().join("real.csv"), temp_dir.path().join("linked.csv")).unwrap();

        let files = find_point_files(temp_dir.path(), &["csv"]).unwrap();
        assert_eq!(files, vec![temp_dir.path().join("linked.csv")]);
    }

    #[test]
    fn test_find_point_files_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let result = find_point_files(&temp_dir.path().join("nope"), &["las"]);
        assert!(matches!(result, Err(LoaderError::Walk(_))));
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    /// Writes a LAS tile; point format 1 carries GPS time, format 0 does not.
    fn write_las(path: &Path, format: u8, points: &[(f64, f64, f64)]) {
        use las::Write as _;

        let mut builder = las::Builder::from((1, 2));
        builder.point_format = las::point::Format::new(format).unwrap();
        let header = builder.into_header().unwrap();
        let mut writer = las::Writer::from_path(path, header).unwrap();

        for (i, &(x, y, z)) in points.iter().enumerate() {
            let point = las::Point {
                x,
                y,
                z,
                intensity: 100 + i as u16,
                return_number: 1,
                number_of_returns: 2,
                classification: las::point::Classification::Ground,
                gps_time: (format == 1).then(|| 1000.0 + i as f64),
                ..Default::default()
            };
            writer.write(point).unwrap();
        }
        writer.close().unwrap();
    }

    #[test]
    fn test_las_reader_extents_from_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tile.las");
        write_las(&path, 1, &[(1.0, 2.0, 3.0), (4.0, 6.0, 9.5), (2.5, 3.0, 0.5)]);

        let extents = LasReader.read_extents(&path).unwrap();
        for (got, want) in extents.min.iter().zip([1.0, 2.0, 0.5]) {
            assert!(approx(*got, want), "min {} != {}", got, want);
        }
        for (got, want) in extents.max.iter().zip([4.0, 6.0, 9.5]) {
            assert!(approx(*got, want), "max {} != {}", got, want);
        }
    }

    #[test]
    fn test_las_reader_points_and_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tile.las");
        write_las(&path, 1, &[(1.0, 2.0, 3.0), (4.0, 6.0, 9.5)]);

        let cloud = LasReader.read_points(&path).unwrap();

        assert_eq!(cloud.len(), 2);
        assert!(approx(cloud.x[1], 4.0));
        assert!(approx(cloud.z[1], 9.5));
        assert_eq!(cloud.field("intensity"), Some(&[100.0, 101.0][..]));
        assert_eq!(cloud.field("return_number"), Some(&[1.0, 1.0][..]));
        assert_eq!(cloud.field("number_of_returns"), Some(&[2.0, 2.0][..]));
        assert_eq!(cloud.field("classification"), Some(&[2.0, 2.0][..]));
        assert_eq!(cloud.field("gps_time"), Some(&[1000.0, 1001.0][..]));
    }

    #[test]
    fn test_las_reader_without_gps_time() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tile.las");
        write_las(&path, 0, &[(0.0, 0.0, 0.0)]);

        let cloud = LasReader.read_points(&path).unwrap();
        assert_eq!(cloud.len(), 1);
        assert!(cloud.field("gps_time").is_none());
        assert!(cloud.field("classification").is_some());
    }

    #[test]
    fn test_las_reader_rejects_non_las() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tile.las");
        fs::write(&path, "not a las file").unwrap();

        assert!(matches!(LasReader.read_extents(&path), Err(LoaderError::Las(_))));
    }

    #[test]
    fn test_any_reader_for_path() {
        assert!(matches!(AnyReader::for_path(Path::new("t/a.LAS")), Some(AnyReader::Las(_))));
        assert!(matches!(AnyReader::for_path(Path::new("b.csv")), Some(AnyReader::Csv(_))));
        assert!(AnyReader::for_path(Path::new("c.laz")).is_none());
        assert!(AnyReader::for_path(Path::new("noext")).is_none());

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tile.csv");
        write_csv(&path, &[(1.0, 2.0, 3.0, 4.0)]);

        let reader = AnyReader::for_path(&path).unwrap();
        assert_eq!(reader.read_points(&path).unwrap().len(), 1);
    }
}
