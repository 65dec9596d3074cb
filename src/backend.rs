use geojson::Feature;
use std::thread::JoinHandle;

use crate::comms::{messages::*, ComputeComms};
use crate::consts::UNASSIGNED_ID;
use crate::geometry::{
    flatten_shape, merge, simplify_if_greater_than, CanonicalPolygon, Normalizer, ShapeGeometry,
    SourceTag,
};
use crate::parameters::GeometryParameters;
use crate::{wire, Error, Result};

/// The reference compute unit: executes jobs off the controller's thread,
/// one at a time in the order they arrive.
pub struct ComputeBackend {
    comms: ComputeComms<ComputeStatus, ComputeJob>,
    normalizer: Normalizer,
}

impl ComputeBackend {
    /// Runs until the controller side hangs up
    pub fn boot(
        comms: ComputeComms<ComputeStatus, ComputeJob>,
        params: GeometryParameters,
    ) -> Result<JoinHandle<()>> {
        let handle = std::thread::Builder::new()
            .name("compute".to_string())
            .spawn(move || {
                let normalizer = match Normalizer::new(params) {
                    Ok(n) => n,
                    Err(e) => {
                        log::error!("Could not start the compute unit: {e}");
                        let _ = comms.send(ComputeStatus::Error(JobError {
                            generation: None,
                            message: e.to_string(),
                            fatal: true,
                        }));
                        return;
                    }
                };

                let mut backend = ComputeBackend { comms, normalizer };
                backend.run();
            })?;
        Ok(handle)
    }

    fn run(&mut self) {
        while let Ok(job) = self.comms.recv() {
            log::debug!(
                "Compute unit got a {:?} job of generation {}",
                job.source(),
                job.generation()
            );
            if let Err(e) = self.execute(job) {
                // the only failure is a hung up controller
                log::debug!("Compute unit stopping: {e}");
                return;
            }
        }
        log::debug!("Controller hung up, compute unit stopping");
    }

    fn execute(&mut self, job: ComputeJob) -> Result<()> {
        match job {
            ComputeJob::Start {
                id,
                generation,
                source,
                items,
            } => {
                self.comms.send(ComputeStatus::Calculating { generation })?;
                let results = self.flatten_items(generation, items)?;
                self.comms.send(ComputeStatus::Done(JobDone {
                    id,
                    generation,
                    source,
                    data: JobData::Items(results),
                }))
            }
            ComputeJob::Flatten {
                id,
                generation,
                source,
                items,
            } => {
                self.comms.send(ComputeStatus::Calculating { generation })?;
                let region = self.merge_items(items);
                self.comms.send(ComputeStatus::Done(JobDone {
                    id,
                    generation,
                    source,
                    data: JobData::Aggregate(region),
                }))
            }
            ComputeJob::Upload {
                id,
                generation,
                source,
                payload,
            } => {
                self.comms.send(ComputeStatus::OpeningFile { generation })?;
                let features = match payload {
                    UploadPayload::File { name, contents } => {
                        self.comms.send(ComputeStatus::ProcessingFile { generation })?;
                        match read_upload(&name, &contents) {
                            Ok(features) => features,
                            Err(message) => {
                                return self.comms.send(ComputeStatus::UploadError(JobError {
                                    generation: Some(generation),
                                    message,
                                    fatal: true,
                                }));
                            }
                        }
                    }
                    UploadPayload::Features { collection } => collection.features,
                };

                self.comms.send(ComputeStatus::ProcessingFeatures { generation })?;
                let results = self.convert_features(generation, features)?;

                self.comms.send(ComputeStatus::Calculating { generation })?;
                self.comms.send(ComputeStatus::Done(JobDone {
                    id,
                    generation,
                    source,
                    data: JobData::Items(results),
                }))
            }
        }
    }

    // one result per shape, repaired and flattened
    fn flatten_items(&self, generation: u64, items: Vec<JobItem>) -> Result<Vec<ItemResult>> {
        let params = self.normalizer.params();
        let mut results = Vec::with_capacity(items.len());

        for item in items {
            let canonical = match wire::canonical_from_feature(&item.geometry) {
                Ok(c) => c,
                Err(e) => {
                    self.item_error(generation, item.id, &e)?;
                    continue;
                }
            };
            let flat = flatten_shape(canonical, params.skip_resolve, params.skip_merge);

            results.push(ItemResult {
                id: item.id,
                wkt: wire::to_wkt(&flat),
                area: wire::acres(self.normalizer.frames(), &flat),
                edit_id: item.edit_id,
                geometry: None,
            });
        }
        Ok(results)
    }

    // the whole set in one region, or nothing if there is nothing to merge
    fn merge_items(&self, items: Vec<JobItem>) -> Option<AggregateResult> {
        let params = self.normalizer.params();

        let mut ids = Vec::with_capacity(items.len());
        let mut polygons = Vec::with_capacity(items.len());
        for item in items {
            match wire::canonical_from_feature(&item.geometry) {
                Ok(c) => {
                    ids.push(item.id);
                    polygons.push(flatten_shape(c, params.skip_resolve, params.skip_merge));
                }
                Err(e) => log::warn!("Leaving shape {} out of the merge: {e}", item.id),
            }
        }

        // the shapes were repaired one by one above
        let merged = merge(polygons, true);
        let dropped_ids: Vec<i64> = merged.dropped.iter().map(|&i| ids[i]).collect();
        if !dropped_ids.is_empty() {
            log::warn!("The merged region is missing shapes {dropped_ids:?}");
        }

        let region = merged.region?;
        Some(AggregateResult {
            wkt: self.display_wkt(&region),
            area: wire::acres(self.normalizer.frames(), &region),
            geometry: wire::to_feature(&region, UNASSIGNED_ID, SourceTag::Unknown, None),
            dropped_ids,
        })
    }

    // the host gets a lighter outline than the one kept for merging
    fn display_wkt(&self, region: &CanonicalPolygon) -> String {
        let frames = self.normalizer.frames();
        let limit = self.normalizer.params().display_simplify_limit;

        let simplified = frames.to_geographic(region).and_then(|mut geographic| {
            if simplify_if_greater_than(limit, &mut geographic) {
                frames.to_working(&geographic).map(Some)
            } else {
                Ok(None)
            }
        });

        match simplified {
            Ok(Some(display)) => wire::to_wkt(&display),
            Ok(None) => wire::to_wkt(region),
            Err(e) => {
                log::warn!("Could not simplify the merged region for display: {e}");
                wire::to_wkt(region)
            }
        }
    }

    // uploaded features are geographic, results are canonical polygons in the working frame
    fn convert_features(&self, generation: u64, features: Vec<Feature>) -> Result<Vec<ItemResult>> {
        let params = self.normalizer.params();
        let mut results = Vec::with_capacity(features.len());

        for (i, feature) in features.iter().enumerate() {
            let buffer = wire::feature_buffer(feature);
            let converted = wire::shape_geometry_from_feature(feature)
                .and_then(|shape| self.geographic_to_working(shape))
                .and_then(|shape| self.normalizer.normalize(&shape, buffer));

            let canonical = match converted {
                Ok(c) => flatten_shape(c, params.upload_skip_resolve, params.skip_merge),
                Err(e) => {
                    self.comms.send(ComputeStatus::UploadError(JobError {
                        generation: Some(generation),
                        message: format!("Feature {i}: {e}"),
                        fatal: false,
                    }))?;
                    continue;
                }
            };

            results.push(ItemResult {
                id: UNASSIGNED_ID,
                wkt: wire::to_wkt(&canonical),
                area: wire::acres(self.normalizer.frames(), &canonical),
                edit_id: None,
                geometry: Some(wire::to_feature(&canonical, UNASSIGNED_ID, SourceTag::Upload, buffer)),
            });
        }
        Ok(results)
    }

    fn geographic_to_working(&self, shape: ShapeGeometry) -> Result<ShapeGeometry> {
        let frames = self.normalizer.frames();
        Ok(match shape {
            ShapeGeometry::Point(p) => ShapeGeometry::Point(frames.to_working(&p)?),
            ShapeGeometry::Line(l) => ShapeGeometry::Line(frames.to_working(&l)?),
            ShapeGeometry::Polygon(p) => ShapeGeometry::Polygon(frames.to_working(&p)?),
            ShapeGeometry::MultiPolygon(mp) => ShapeGeometry::MultiPolygon(frames.to_working(&mp)?),
            // the radius is already a working frame length
            ShapeGeometry::Circle { center, radius } => ShapeGeometry::Circle {
                center: frames.to_working(&geo::Point::from(center))?.0,
                radius,
            },
        })
    }

    fn item_error(&self, generation: u64, id: i64, e: &Error) -> Result<()> {
        log::warn!("Could not flatten shape {id}: {e}");
        self.comms.send(ComputeStatus::Error(JobError {
            generation: Some(generation),
            message: format!("Shape {id}: {e}"),
            fatal: false,
        }))
    }
}

// only GeoJSON is understood, everything else is for an outside converter
fn read_upload(name: &str, contents: &str) -> std::result::Result<Vec<Feature>, String> {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "json" | "geojson" => {
            wire::features_from_str(contents).map_err(|e| format!("Could not read {name}: {e}"))
        }
        _ => Err(format!("Unsupported file format: {name}")),
    }
}
