//! Session-lifetime image caches.
//!
//! Two levels: one blank template per detector, and one accumulating
//! composite per (detector, bandpass). Nothing is ever evicted; the writer
//! flushes everything at the end of the session.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use log::{debug, info};

use crate::hardware::detector::DetectorGeometry;
use crate::image_proc::image::CompositeImage;
use crate::wcs::WcsError;

/// Composite key: detector file-safe name and bandpass name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageKey {
    pub detector: String,
    pub bandpass: String,
}

impl ImageKey {
    pub fn new(detector: &DetectorGeometry, bandpass: &str) -> Self {
        Self {
            detector: detector.file_name().to_string(),
            bandpass: bandpass.to_string(),
        }
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}_{}", self.detector, self.bandpass)
    }
}

#[derive(Debug, Default)]
pub struct ImageCache {
    blanks: HashMap<String, CompositeImage>,
    composites: BTreeMap<ImageKey, CompositeImage>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn blank_copy(
        blanks: &mut HashMap<String, CompositeImage>,
        detector: &DetectorGeometry,
    ) -> Result<CompositeImage, WcsError> {
        if let Some(template) = blanks.get(detector.file_name()) {
            return Ok(template.clone());
        }
        let template = CompositeImage::blank(detector.bounds(), detector.wcs()?);
        debug!(
            "Cached {} blank template for {}",
            template.size(),
            detector.name()
        );
        blanks.insert(detector.file_name().to_string(), template.clone());
        Ok(template)
    }

    /// Independent zero-filled copy of the detector's blank template.
    ///
    /// The first call for a detector builds the template (and its WCS).
    pub fn blank(&mut self, detector: &DetectorGeometry) -> Result<CompositeImage, WcsError> {
        Self::blank_copy(&mut self.blanks, detector)
    }

    /// Composite for `(detector, bandpass)`, created from a blank copy on
    /// first reference. `init` runs exactly once per key, on creation.
    pub fn get_or_create<E, F>(
        &mut self,
        detector: &DetectorGeometry,
        bandpass: &str,
        init: F,
    ) -> Result<&mut CompositeImage, E>
    where
        E: From<WcsError>,
        F: FnOnce(&mut CompositeImage) -> Result<(), E>,
    {
        match self.composites.entry(ImageKey::new(detector, bandpass)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let mut image = Self::blank_copy(&mut self.blanks, detector)?;
                init(&mut image)?;
                info!("Created composite {}", entry.key());
                Ok(entry.insert(image))
            }
        }
    }

    pub fn get(&self, key: &ImageKey) -> Option<&CompositeImage> {
        self.composites.get(key)
    }

    pub fn get_mut(&mut self, key: &ImageKey) -> Option<&mut CompositeImage> {
        self.composites.get_mut(key)
    }

    /// Composites in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ImageKey, &CompositeImage)> {
        self.composites.iter()
    }

    pub fn len(&self) -> usize {
        self.composites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.composites.is_empty()
    }

    pub fn blank_count(&self) -> usize {
        self.blanks.len()
    }
}
