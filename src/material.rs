// src/material.rs
//
// Refractive-index database in the refractiveindex.info layout: a
// `catalog-nk.yml` tree of shelves/books/pages plus one YAML data file per page.

use crate::calculation::ExtinctionSource;
use crate::error::MaterialError;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub const CATALOG_FILE: &str = "catalog-nk.yml";

/// `shelf/book/page` address of one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MaterialPath {
    pub shelf: String,
    pub book: String,
    pub page: String,
}

impl MaterialPath {
    pub fn new(shelf: impl Into<String>, book: impl Into<String>, page: impl Into<String>) -> Self {
        Self {
            shelf: shelf.into(),
            book: book.into(),
            page: page.into(),
        }
    }
}

impl fmt::Display for MaterialPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.shelf, self.book, self.page)
    }
}

impl FromStr for MaterialPath {
    type Err = MaterialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().splitn(3, '/').collect();
        match parts.as_slice() {
            [shelf, book, page] if !shelf.is_empty() && !book.is_empty() && !page.is_empty() => {
                Ok(Self::new(*shelf, *book, *page))
            }
            _ => Err(MaterialError::InvalidPath(s.to_string())),
        }
    }
}

/// A catalog level is an ordered list of selectable items interleaved with dividers.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry<T> {
    Divider(String),
    Item(T),
}

impl<T> Entry<T> {
    pub fn item(&self) -> Option<&T> {
        match self {
            Entry::Item(item) => Some(item),
            Entry::Divider(_) => None,
        }
    }
}

pub trait CatalogItem {
    fn key(&self) -> &str;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shelf {
    pub key: String,
    pub name: String,
    pub books: Vec<Entry<Book>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub key: String,
    pub name: String,
    pub pages: Vec<Entry<Page>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub key: String,
    pub name: String,
    /// Data file relative to the database `data` folder, when the catalog names one.
    pub data: Option<String>,
}

macro_rules! impl_catalog_item {
    ($($ty:ty),*) => {
        $(impl CatalogItem for $ty {
            fn key(&self) -> &str {
                &self.key
            }
            fn name(&self) -> &str {
                &self.name
            }
        })*
    };
}

impl_catalog_item!(Shelf, Book, Page);

/// First entry that is not a divider.
pub fn first_selectable<T>(entries: &[Entry<T>]) -> Option<&T> {
    entries.iter().find_map(Entry::item)
}

pub fn find_item<'a, T: CatalogItem>(entries: &'a [Entry<T>], key: &str) -> Option<&'a T> {
    entries.iter().filter_map(Entry::item).find(|item| item.key() == key)
}

/// Catalog names carry HTML markup (`<sub>`, `<i>`); strip the tags for display.
pub fn display_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub shelves: Vec<Entry<Shelf>>,
}

impl Catalog {
    pub fn parse(yaml: &str) -> Result<Self, MaterialError> {
        let raw: Vec<RawShelf> = serde_yaml::from_str(yaml)?;
        let shelves = raw.into_iter().map(RawShelf::into_entry).collect();
        Ok(Self { shelves })
    }

    pub fn load(path: &Path) -> Result<Self, MaterialError> {
        if !path.is_file() {
            return Err(MaterialError::CatalogNotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn shelf(&self, key: &str) -> Option<&Shelf> {
        find_item(&self.shelves, key)
    }

    pub fn book(&self, shelf: &str, book: &str) -> Option<&Book> {
        self.shelf(shelf).and_then(|s| find_item(&s.books, book))
    }

    pub fn page(&self, path: &MaterialPath) -> Option<&Page> {
        self.book(&path.shelf, &path.book)
            .and_then(|b| find_item(&b.pages, &path.page))
    }

    /// Path of the first selectable shelf/book/page, the default selection.
    pub fn default_path(&self) -> Option<MaterialPath> {
        let shelf = first_selectable(&self.shelves)?;
        let book = first_selectable(&shelf.books)?;
        let page = first_selectable(&book.pages)?;
        Some(MaterialPath::new(&shelf.key, &book.key, &page.key))
    }
}

// Keys in the public catalog are occasionally bare numbers (years).
fn yaml_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match serde_yaml::Value::deserialize(d)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(D::Error::custom(format!("unsupported catalog value {other:?}"))),
    }
}

fn opt_yaml_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    yaml_string(d).map(Some)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawShelf {
    Divider {
        #[serde(rename = "DIVIDER", deserialize_with = "yaml_string")]
        divider: String,
    },
    Shelf {
        #[serde(rename = "SHELF", deserialize_with = "yaml_string")]
        key: String,
        #[serde(default, deserialize_with = "opt_yaml_string")]
        name: Option<String>,
        #[serde(default)]
        content: Vec<RawBook>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBook {
    Divider {
        #[serde(rename = "DIVIDER", deserialize_with = "yaml_string")]
        divider: String,
    },
    Book {
        #[serde(rename = "BOOK", deserialize_with = "yaml_string")]
        key: String,
        #[serde(default, deserialize_with = "opt_yaml_string")]
        name: Option<String>,
        #[serde(default)]
        content: Vec<RawPage>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPage {
    Divider {
        #[serde(rename = "DIVIDER", deserialize_with = "yaml_string")]
        divider: String,
    },
    Page {
        #[serde(rename = "PAGE", deserialize_with = "yaml_string")]
        key: String,
        #[serde(default, deserialize_with = "opt_yaml_string")]
        name: Option<String>,
        #[serde(default)]
        data: Option<String>,
    },
}

impl RawShelf {
    fn into_entry(self) -> Entry<Shelf> {
        match self {
            RawShelf::Divider { divider } => Entry::Divider(divider),
            RawShelf::Shelf { key, name, content } => Entry::Item(Shelf {
                name: name.unwrap_or_else(|| key.clone()),
                key,
                books: content.into_iter().map(RawBook::into_entry).collect(),
            }),
        }
    }
}

impl RawBook {
    fn into_entry(self) -> Entry<Book> {
        match self {
            RawBook::Divider { divider } => Entry::Divider(divider),
            RawBook::Book { key, name, content } => Entry::Item(Book {
                name: name.unwrap_or_else(|| key.clone()),
                key,
                pages: content.into_iter().map(RawPage::into_entry).collect(),
            }),
        }
    }
}

impl RawPage {
    fn into_entry(self) -> Entry<Page> {
        match self {
            RawPage::Divider { divider } => Entry::Divider(divider),
            RawPage::Page { key, name, data } => Entry::Item(Page {
                name: name.unwrap_or_else(|| key.clone()),
                key,
                data,
            }),
        }
    }
}

#[derive(Deserialize)]
struct RawMaterialFile {
    #[serde(rename = "DATA", default)]
    data: Vec<RawDataBlock>,
}

#[derive(Deserialize)]
struct RawDataBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<String>,
}

/// Tabulated optical constants of one dataset. Only k is kept; formula entries
/// describe n alone.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialData {
    /// `(wavelength_um, k)` sorted by wavelength.
    k: Vec<(f64, f64)>,
}

impl MaterialData {
    pub fn parse(yaml: &str) -> Result<Self, MaterialError> {
        let raw: RawMaterialFile = serde_yaml::from_str(yaml)?;
        let mut k = Vec::new();

        for block in raw.data {
            let column = match block.kind.trim() {
                "tabulated nk" => 2,
                "tabulated k" => 1,
                _ => continue,
            };
            let Some(table) = block.data else { continue };
            for line in table.lines().map(str::trim).filter(|l| !l.is_empty()) {
                let values: Vec<f64> = line
                    .split_whitespace()
                    .map(f64::from_str)
                    .collect::<Result<_, _>>()
                    .map_err(|_| MaterialError::MalformedRow(line.to_string()))?;
                if values.len() <= column {
                    return Err(MaterialError::MalformedRow(line.to_string()));
                }
                k.push((values[0], values[column]));
            }
        }

        k.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self { k })
    }

    pub fn has_extinction_data(&self) -> bool {
        !self.k.is_empty()
    }

    /// Wavelength range (µm) covered by the k table.
    pub fn k_range(&self) -> Option<(f64, f64)> {
        Some((self.k.first()?.0, self.k.last()?.0))
    }

    /// Linearly interpolated k at `wavelength_um`.
    pub fn extinction_coefficient(&self, wavelength_um: f64) -> Option<Result<f64, MaterialError>> {
        let (min, max) = self.k_range()?;
        if !(min..=max).contains(&wavelength_um) {
            return Some(Err(MaterialError::OutOfRange {
                wavelength: wavelength_um,
                min,
                max,
            }));
        }

        let idx = self.k.partition_point(|&(wl, _)| wl < wavelength_um);
        let (wl_hi, k_hi) = self.k[idx];
        if idx == 0 || wl_hi == wavelength_um {
            return Some(Ok(k_hi));
        }
        let (wl_lo, k_lo) = self.k[idx - 1];
        let t = (wavelength_um - wl_lo) / (wl_hi - wl_lo);
        Some(Ok(k_lo + t * (k_hi - k_lo)))
    }
}

/// Catalog plus lazily loaded, cached material data files.
pub struct MaterialLibrary {
    root: PathBuf,
    catalog: Catalog,
    cache: Mutex<HashMap<MaterialPath, Arc<MaterialData>>>,
}

impl MaterialLibrary {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, MaterialError> {
        let root = root.into();
        let catalog = Catalog::load(&root.join(CATALOG_FILE))?;
        info!(
            "Material catalog loaded from {} ({} shelves)",
            root.display(),
            catalog.shelves.iter().filter_map(Entry::item).count()
        );
        Ok(Self {
            root,
            catalog,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn data_file(&self, path: &MaterialPath) -> Result<PathBuf, MaterialError> {
        let page = self
            .catalog
            .page(path)
            .ok_or_else(|| MaterialError::UnknownMaterial(path.to_string()))?;

        let candidates = match &page.data {
            Some(rel) => vec![self.root.join("data").join(rel), self.root.join("data-nk").join(rel)],
            None => vec![self
                .root
                .join("data")
                .join(&path.shelf)
                .join(&path.book)
                .join("nk")
                .join(format!("{}.yml", path.page))],
        };

        candidates
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| MaterialError::DataNotFound(path.to_string()))
    }

    pub fn load(&self, path: &MaterialPath) -> Result<Arc<MaterialData>, MaterialError> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(data) = cache.get(path) {
            return Ok(Arc::clone(data));
        }

        let file = self.data_file(path)?;
        debug!("Loading material data {} from {}", path, file.display());
        let data = Arc::new(MaterialData::parse(&fs::read_to_string(&file)?)?);
        cache.insert(path.clone(), Arc::clone(&data));
        Ok(data)
    }
}

impl ExtinctionSource for MaterialLibrary {
    fn extinction_coefficient(&self, path: &MaterialPath, wavelength_um: f64) -> Result<f64, MaterialError> {
        self.load(path)?
            .extinction_coefficient(wavelength_um)
            .unwrap_or_else(|| Err(MaterialError::NoExtinctionData(path.to_string())))
    }
}
