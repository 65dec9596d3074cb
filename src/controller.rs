use geojson::{Feature, FeatureCollection};
use std::{
    collections::HashMap,
    fmt::Display,
    sync::mpsc::{self, RecvTimeoutError, TryRecvError},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crate::backend::ComputeBackend;
use crate::comms::{messages::*, ComputeComms};
use crate::consts::UNASSIGNED_ID;
use crate::geometry::{CanonicalPolygon, DrawMode, Normalizer, Shape, ShapeGeometry, SourceTag};
use crate::parameters::{SessionParameters, StaleResultPolicy};
use crate::{wire, Error, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum EditState {
    #[default]
    Idle,
    Drawing,
    Modifying,
}

impl Display for EditState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EditState::Idle => "idle",
            EditState::Drawing => "drawing",
            EditState::Modifying => "modifying",
        })
    }
}

/// Which map tools are switched on
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ToolState {
    pub draw: bool,
    pub modify: bool,
    pub select: bool,
    pub mode: DrawMode,
}

#[derive(Debug, Clone)]
struct PendingJob {
    source: JobSource,
    ids: Vec<i64>,
}

/// Everything about the current editing session, owned by the controller
#[derive(Debug, Default)]
pub struct Session {
    // commit order
    shapes: Vec<Shape>,
    merged: Option<CanonicalPolygon>,
    next_id: i64,
    buffer_feet: f64,
    state: EditState,
    tools: ToolState,
    // revision of every editable shape when modifying started
    snapshot: HashMap<i64, u64>,

    next_generation: u64,
    pending: HashMap<u64, PendingJob>,
    // newest flatten/init result applied to `merged`
    applied_aggregate: Option<u64>,
}

impl Session {
    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn shape(&self, id: i64) -> Option<&Shape> {
        self.shapes.iter().find(|s| s.tracking_id == id)
    }

    fn shape_mut(&mut self, id: i64) -> Option<&mut Shape> {
        self.shapes.iter_mut().find(|s| s.tracking_id == id)
    }

    pub fn merged(&self) -> Option<&CanonicalPolygon> {
        self.merged.as_ref()
    }

    pub fn state(&self) -> EditState {
        self.state
    }

    pub fn tools(&self) -> ToolState {
        self.tools
    }

    pub fn buffer_feet(&self) -> f64 {
        self.buffer_feet
    }

    /// The id the next committed shape will get
    pub fn next_tracking_id(&self) -> i64 {
        self.next_id
    }

    pub fn outstanding_jobs(&self) -> usize {
        self.pending.len()
    }

    /// Selected shapes if any are selected, otherwise all of them
    pub fn editable_ids(&self) -> Vec<i64> {
        let selected: Vec<i64> = self
            .shapes
            .iter()
            .filter(|s| s.selected)
            .map(|s| s.tracking_id)
            .collect();
        if selected.is_empty() {
            self.shapes.iter().map(|s| s.tracking_id).collect()
        } else {
            selected
        }
    }

    fn take_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn take_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }
}

/// Drives the draw/select/modify state machine, owns the shapes and the merged region,
/// and keeps the merged region in step with the shapes through the compute unit.
pub struct Controller {
    session: Session,
    params: SessionParameters,
    normalizer: Normalizer,
    comms: ComputeComms<ComputeJob, ComputeStatus>,
    host: mpsc::Sender<HostEvent>,
}

impl Controller {
    pub fn new(
        params: SessionParameters,
        comms: ComputeComms<ComputeJob, ComputeStatus>,
        host: mpsc::Sender<HostEvent>,
    ) -> Result<Self> {
        let normalizer = Normalizer::new(params.geometry.clone())?;
        let session = Session {
            buffer_feet: params.geometry.default_buffer_feet,
            ..Default::default()
        };

        Ok(Controller {
            session,
            params,
            normalizer,
            comms,
            host,
        })
    }

    /// A controller wired to a freshly booted compute unit
    pub fn with_backend(
        params: SessionParameters,
        host: mpsc::Sender<HostEvent>,
    ) -> Result<(Self, JoinHandle<()>)> {
        let (controller_comms, compute_comms) = ComputeComms::new();
        let handle = ComputeBackend::boot(compute_comms, params.geometry.clone())?;
        Ok((Controller::new(params, controller_comms, host)?, handle))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn handle_command(&mut self, command: HostCommand) -> Result<()> {
        match command {
            HostCommand::SetBuffer(feet) => self.set_buffer(feet),
            HostCommand::StartDrawingWithMode(mode) => self.enable_draw(mode)?,
            HostCommand::EnableModify => self.start_modify()?,
            HostCommand::DisableModify => {
                if self.session.state == EditState::Modifying {
                    self.finish_modify()?;
                }
                self.session.tools.modify = false;
            }
            HostCommand::DisableDraw => {
                if self.session.state == EditState::Drawing {
                    self.abort_drawing()?;
                }
                self.session.tools.draw = false;
            }
            HostCommand::SelectById { id, selected } => self.select_by_id(id, selected)?,
            HostCommand::DeleteById(id) => {
                self.delete_by_id(id)?;
            }
            HostCommand::SetShapes { shapes, clear } => self.replace_shapes(shapes, clear)?,
            HostCommand::AddReferenceItems(features) => self.add_reference_items(features)?,
            HostCommand::Upload { name, contents } => self.upload(name, contents)?,
            HostCommand::ExternalImport(collection) => self.external_import(collection)?,
        }
        Ok(())
    }

    /// Applies to shapes committed from now on. Values that are not positive and finite are ignored.
    pub fn set_buffer(&mut self, feet: f64) {
        if feet.is_finite() && feet > 0. {
            self.session.buffer_feet = feet;
        } else {
            log::warn!("Ignoring buffer of {feet} ft");
        }
    }

    /// Switches the draw tool on, ending any modify session first
    pub fn enable_draw(&mut self, mode: DrawMode) -> Result<()> {
        match self.session.state {
            EditState::Drawing => return Err(self.invalid("change the draw mode")),
            EditState::Modifying => {
                self.finish_modify()?;
            }
            EditState::Idle => (),
        }
        self.session.tools.draw = true;
        self.session.tools.modify = false;
        self.session.tools.mode = mode;
        Ok(())
    }

    pub fn start_drawing(&mut self) -> Result<()> {
        if self.session.state != EditState::Idle {
            return Err(self.invalid("start drawing"));
        }
        if !self.session.tools.draw {
            return Err(Error::ToolDisabled("draw"));
        }

        self.session.state = EditState::Drawing;
        self.emit(HostEvent::DrawingStarted)
    }

    /// Commits the drawn shape and returns its tracking id.
    /// Nothing is committed if the shape cannot be normalized.
    pub fn finish_drawing(&mut self, geometry: ShapeGeometry) -> Result<i64> {
        if self.session.state != EditState::Drawing {
            return Err(self.invalid("finish drawing"));
        }
        self.session.state = EditState::Idle;

        let buffer = Some(self.session.buffer_feet);
        let canonical = self.normalizer.normalize(&geometry, buffer)?;

        let id = self.session.take_id();
        let shape = Shape::new(id, geometry, buffer, SourceTag::Draw, canonical);
        let item = job_item(&shape, None);
        self.session.shapes.push(shape);

        self.session.tools.draw = false;
        self.session.tools.modify = true;
        self.session.tools.select = true;

        self.dispatch_start(JobSource::DrawingEnd, vec![item])?;
        Ok(id)
    }

    pub fn abort_drawing(&mut self) -> Result<()> {
        if self.session.state != EditState::Drawing {
            return Err(self.invalid("abort drawing"));
        }
        self.session.state = EditState::Idle;
        Ok(())
    }

    pub fn start_modify(&mut self) -> Result<()> {
        match self.session.state {
            EditState::Idle => (),
            // already modifying
            EditState::Modifying => return Ok(()),
            EditState::Drawing => return Err(self.invalid("start modifying")),
        }

        self.session.snapshot = self
            .session
            .editable_ids()
            .into_iter()
            .filter_map(|id| self.session.shape(id).map(|s| (id, s.revision)))
            .collect();
        self.session.tools.modify = true;
        self.session.state = EditState::Modifying;
        self.emit(HostEvent::DrawingStarted)
    }

    /// One edit gesture on a shape in the modify tool's working set.
    /// An edit that cannot be normalized is refused and the shape keeps its previous outline.
    pub fn edit_shape(&mut self, id: i64, geometry: ShapeGeometry) -> Result<()> {
        if self.session.state != EditState::Modifying {
            return Err(self.invalid("edit a shape"));
        }
        if !self.session.snapshot.contains_key(&id) {
            return Err(Error::UnknownShape(id));
        }

        let shape = self.session.shape_mut(id).ok_or(Error::UnknownShape(id))?;
        let canonical = self.normalizer.normalize(&geometry, shape.buffer_feet)?;
        shape.geometry = geometry;
        shape.canonical = canonical;
        shape.revision += 1;
        Ok(())
    }

    /// Ends the modify session and returns the ids of the shapes that changed
    pub fn finish_modify(&mut self) -> Result<Vec<i64>> {
        if self.session.state != EditState::Modifying {
            return Err(self.invalid("finish modifying"));
        }
        self.session.state = EditState::Idle;
        let snapshot = std::mem::take(&mut self.session.snapshot);

        // edits were normalized as they came in
        let mut items = vec![];
        for shape in self.session.shapes.iter_mut() {
            let Some(&before) = snapshot.get(&shape.tracking_id) else {
                continue;
            };
            if shape.revision <= before {
                continue;
            }

            shape.source = SourceTag::Draw;
            items.push(job_item(shape, Some(shape.revision)));
        }

        let changed: Vec<i64> = items.iter().map(|i| i.id).collect();
        if !items.is_empty() {
            self.dispatch_start(JobSource::ModifyEnd, items)?;
        }
        Ok(changed)
    }

    /// Returns whether a shape was removed. Unknown ids are ignored.
    pub fn delete_by_id(&mut self, id: i64) -> Result<bool> {
        let before = self.session.shapes.len();
        self.session.shapes.retain(|s| s.tracking_id != id);
        if self.session.shapes.len() == before {
            return Ok(false);
        }

        self.session.snapshot.remove(&id);
        self.emit(HostEvent::DrawingStarted)?;
        self.remerge()?;
        Ok(true)
    }

    pub fn select_by_id(&mut self, id: i64, selected: bool) -> Result<()> {
        let shape = self.session.shape_mut(id).ok_or(Error::UnknownShape(id))?;
        shape.selected = selected;
        Ok(())
    }

    /// Bulk load from the server. Fails without touching the session if any shape is unusable.
    /// The counter moves past the server's ids and is never rewound.
    pub fn replace_shapes(&mut self, shapes: Vec<ServerShape>, clear: bool) -> Result<()> {
        let mut loaded = Vec::with_capacity(shapes.len());
        let mut next_id = self.session.next_id;
        for ServerShape { id, wkt } in shapes {
            // the counter has to be able to move past every id
            let after = id
                .checked_add(1)
                .filter(|_| id >= 0)
                .ok_or(Error::InvalidTrackingId(id))?;
            next_id = next_id.max(after);

            let geometry = wire::shape_geometry_from_wkt(&wkt)?;
            let canonical = self.normalizer.normalize(&geometry, None)?;
            loaded.push(Shape::new(id, geometry, None, SourceTag::Server, canonical));
        }

        if clear {
            self.session.shapes.clear();
            self.session.snapshot.clear();
            self.session.merged = None;
        }
        self.session.next_id = next_id;
        for shape in loaded {
            self.session.shapes.retain(|s| s.tracking_id != shape.tracking_id);
            self.session.shapes.push(shape);
        }

        self.dispatch_flatten(JobSource::Init)
    }

    /// Shapes picked from a reference layer, committed at once with fresh ids
    pub fn add_reference_items(&mut self, features: Vec<Feature>) -> Result<()> {
        let mut converted = Vec::with_capacity(features.len());
        for feature in &features {
            let geometry = wire::shape_geometry_from_feature(feature)?;
            let buffer = wire::feature_buffer(feature);
            let canonical = self.normalizer.normalize(&geometry, buffer)?;
            converted.push((geometry, buffer, wire::feature_source(feature), canonical));
        }
        if converted.is_empty() {
            return Ok(());
        }

        self.emit(HostEvent::DrawingStarted)?;
        let mut items = Vec::with_capacity(converted.len());
        for (geometry, buffer, source, canonical) in converted {
            let id = self.session.take_id();
            let shape = Shape::new(id, geometry, buffer, source, canonical);
            items.push(job_item(&shape, None));
            self.session.shapes.push(shape);
        }

        self.dispatch_start(JobSource::DrawingEnd, items)
    }

    /// A GeoJSON file from the user, converted by the compute unit
    pub fn upload(&mut self, name: String, contents: String) -> Result<()> {
        self.dispatch_upload(JobSource::Upload, UploadPayload::File { name, contents })
    }

    pub fn external_import(&mut self, collection: FeatureCollection) -> Result<()> {
        self.dispatch_upload(JobSource::ExternalImport, UploadPayload::Features { collection })
    }

    /// Rebuilds the merged region from every current shape
    pub fn remerge(&mut self) -> Result<()> {
        self.dispatch_flatten(JobSource::Flatten)
    }

    /// Handles whatever the compute unit has sent so far without blocking.
    /// Returns the number of messages handled.
    pub fn poll(&mut self) -> Result<usize> {
        let mut handled = 0;
        loop {
            match self.comms.try_recv() {
                Ok(status) => {
                    self.handle_status(status)?;
                    handled += 1;
                }
                Err(TryRecvError::Empty) => return Ok(handled),
                Err(TryRecvError::Disconnected) => return Err(Error::ComputeUnitDisconnected),
            }
        }
    }

    /// Blocks until no job is outstanding or `timeout` has passed.
    /// Returns whether everything settled.
    pub fn settle(&mut self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        while !self.session.pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.comms.recv_timeout(remaining) {
                Ok(status) => self.handle_status(status)?,
                Err(RecvTimeoutError::Timeout) => return Ok(false),
                Err(RecvTimeoutError::Disconnected) => return Err(Error::ComputeUnitDisconnected),
            }
        }
        Ok(true)
    }

    pub fn handle_status(&mut self, status: ComputeStatus) -> Result<()> {
        if let Some(label) = status.phase_label() {
            return self.emit(HostEvent::StatusUpdate {
                status: Status::Phase(label.to_string()),
            });
        }

        match status {
            ComputeStatus::Done(done) => self.handle_done(done),
            ComputeStatus::Error(e) | ComputeStatus::UploadError(e) => {
                log::error!("Compute unit error: {}", e.message);
                if e.fatal {
                    if let Some(generation) = e.generation {
                        self.session.pending.remove(&generation);
                    }
                }
                self.emit(HostEvent::StatusUpdate {
                    status: Status::Error {
                        error: vec![e.message],
                    },
                })
            }
            // progress, handled above
            _ => Ok(()),
        }
    }

    fn handle_done(&mut self, done: JobDone) -> Result<()> {
        let Some(pending) = self.session.pending.remove(&done.generation) else {
            log::warn!(
                "Dropping a {:?} result of generation {}, no such job is outstanding",
                done.source,
                done.generation
            );
            return Ok(());
        };
        if pending.source != done.source {
            log::warn!(
                "Dropping a {:?} result for a {:?} job of generation {}",
                done.source,
                pending.source,
                done.generation
            );
            return Ok(());
        }
        log::debug!("Got the {:?} result of generation {}", done.source, done.generation);

        match (done.source, done.data) {
            (JobSource::Flatten | JobSource::Init, JobData::Aggregate(region)) => {
                self.apply_aggregate(done.generation, done.source, region)
            }
            (JobSource::DrawingEnd, JobData::Items(items)) => {
                let items = self.current_items(&pending, items);
                self.deliver_drawn(items)
            }
            (JobSource::ModifyEnd, JobData::Items(items)) => {
                let items = self.current_items(&pending, items);
                self.deliver_modified(items)
            }
            (JobSource::Upload | JobSource::ExternalImport, JobData::Items(items)) => {
                self.commit_uploaded(items)
            }
            (source, _) => {
                log::warn!("Dropping a {source:?} result with the wrong kind of data");
                Ok(())
            }
        }
    }

    // results for shapes that were dispatched in this job and have not changed since
    fn current_items(&self, pending: &PendingJob, items: Vec<ItemResult>) -> Vec<ItemResult> {
        items
            .into_iter()
            .filter(|item| {
                let Some(shape) = self.session.shape(item.id) else {
                    log::warn!("Dropping the result for shape {}, it is gone", item.id);
                    return false;
                };
                if !pending.ids.contains(&item.id) {
                    log::warn!("Dropping the result for shape {}, it was not asked for", item.id);
                    return false;
                }
                match item.edit_id {
                    Some(revision) if revision != shape.revision => {
                        log::warn!("Dropping an outdated result for shape {}", item.id);
                        false
                    }
                    _ => true,
                }
            })
            .collect()
    }

    fn apply_aggregate(
        &mut self,
        generation: u64,
        source: JobSource,
        region: Option<AggregateResult>,
    ) -> Result<()> {
        if self.params.stale_results == StaleResultPolicy::DropStale
            && self.session.applied_aggregate.is_some_and(|g| g > generation)
        {
            log::warn!("Dropping the stale merged region of generation {generation}");
            return Ok(());
        }
        self.session.applied_aggregate = Some(
            self.session
                .applied_aggregate
                .map_or(generation, |g| g.max(generation)),
        );

        let report = match region {
            Some(region) => {
                self.session.merged = Some(wire::canonical_from_feature(&region.geometry)?);
                if !region.dropped_ids.is_empty() {
                    self.emit(HostEvent::MergeDiagnostics {
                        dropped_ids: region.dropped_ids,
                    })?;
                }
                Some(ShapeReport::polygon(region.area, region.wkt, UNASSIGNED_ID))
            }
            None => {
                self.session.merged = None;
                None
            }
        };

        // a bulk load replaces the region quietly
        if source == JobSource::Flatten {
            self.emit(HostEvent::Flattened(report))?;
        }
        Ok(())
    }

    fn deliver_drawn(&mut self, items: Vec<ItemResult>) -> Result<()> {
        let events = items
            .into_iter()
            .map(|item| HostEvent::DrawingEnded(ShapeReport::polygon(item.area, item.wkt, item.id)))
            .collect();
        self.deliver_paced(events)?;
        self.remerge()
    }

    fn deliver_modified(&mut self, items: Vec<ItemResult>) -> Result<()> {
        let modified_shapes = items
            .into_iter()
            .map(|item| ModifiedShape {
                wkt: item.wkt,
                acres: item.area,
                id: item.id,
                edit_id: item.edit_id,
            })
            .collect();
        self.emit(HostEvent::ModifyEnd { modified_shapes })?;
        self.remerge()
    }

    // the compute unit hands back canonical polygons without ids, they get theirs here
    fn commit_uploaded(&mut self, items: Vec<ItemResult>) -> Result<()> {
        self.emit(HostEvent::DrawingStarted)?;

        let mut events = Vec::with_capacity(items.len());
        for item in items {
            let Some(feature) = item.geometry else {
                log::warn!("Dropping an uploaded shape without geometry");
                continue;
            };
            let canonical = match wire::canonical_from_feature(&feature) {
                Ok(c) => c,
                Err(e) => {
                    log::warn!("Dropping an uploaded shape: {e}");
                    continue;
                }
            };

            let id = self.session.take_id();
            let shape = Shape::new(
                id,
                ShapeGeometry::from(canonical.clone()),
                wire::feature_buffer(&feature),
                SourceTag::Upload,
                canonical,
            );
            self.session.shapes.push(shape);
            events.push(HostEvent::DrawingEnded(ShapeReport::polygon(item.area, item.wkt, id)));
        }

        self.deliver_paced(events)?;
        self.emit(HostEvent::FileUploaded)?;
        self.remerge()
    }

    // one at a time with a pause between, the merge is only triggered after the last
    fn deliver_paced(&self, events: Vec<HostEvent>) -> Result<()> {
        let delay = self.params.item_delivery_delay;
        for (i, event) in events.into_iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                std::thread::sleep(delay);
            }
            self.emit(event)?;
        }
        Ok(())
    }

    fn dispatch_start(&mut self, source: JobSource, items: Vec<JobItem>) -> Result<()> {
        let generation = self.session.take_generation();
        let ids = items.iter().map(|i| i.id).collect();
        self.dispatch(
            ComputeJob::Start {
                id: UNASSIGNED_ID,
                generation,
                source,
                items,
            },
            ids,
        )
    }

    // the whole current set, never a patch of the previous region
    fn dispatch_flatten(&mut self, source: JobSource) -> Result<()> {
        let generation = self.session.take_generation();
        let items: Vec<JobItem> = self.session.shapes.iter().map(|s| job_item(s, None)).collect();
        let ids = items.iter().map(|i| i.id).collect();
        self.dispatch(
            ComputeJob::Flatten {
                id: UNASSIGNED_ID,
                generation,
                source,
                items,
            },
            ids,
        )
    }

    fn dispatch_upload(&mut self, source: JobSource, payload: UploadPayload) -> Result<()> {
        let generation = self.session.take_generation();
        self.dispatch(
            ComputeJob::Upload {
                id: UNASSIGNED_ID,
                generation,
                source,
                payload,
            },
            vec![],
        )
    }

    fn dispatch(&mut self, job: ComputeJob, ids: Vec<i64>) -> Result<()> {
        let generation = job.generation();
        let source = job.source();
        log::debug!(
            "Dispatching a {source:?} job of generation {generation} for {} shapes",
            ids.len()
        );

        self.session
            .pending
            .insert(generation, PendingJob { source, ids });
        if let Err(e) = self.comms.send(job) {
            self.session.pending.remove(&generation);
            return Err(e);
        }
        Ok(())
    }

    // a host that stopped listening is not an error for the session
    fn emit(&self, event: HostEvent) -> Result<()> {
        if self.host.send(event).is_err() {
            log::debug!("Host is not listening, dropping an event");
        }
        Ok(())
    }

    fn invalid(&self, gesture: &'static str) -> Error {
        Error::InvalidTransition {
            from: self.session.state,
            gesture,
        }
    }
}

fn job_item(shape: &Shape, edit_id: Option<u64>) -> JobItem {
    JobItem {
        geometry: wire::to_feature(&shape.canonical, shape.tracking_id, shape.source, shape.buffer_feet),
        id: shape.tracking_id,
        edit_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, polygon, Contains};

    // a controller whose compute side is driven by the test
    fn hand_driven(
        params: SessionParameters,
    ) -> (
        Controller,
        ComputeComms<ComputeStatus, ComputeJob>,
        mpsc::Receiver<HostEvent>,
    ) {
        let (controller_comms, compute_comms) = ComputeComms::new();
        let (host, events) = mpsc::channel();
        let controller = Controller::new(params, controller_comms, host).unwrap();
        (controller, compute_comms, events)
    }

    fn square(x: f64) -> ShapeGeometry {
        ShapeGeometry::Polygon(polygon![
            (x: x, y: 0.),
            (x: x + 100., y: 0.),
            (x: x + 100., y: 100.),
            (x: x, y: 100.),
        ])
    }

    fn draw(controller: &mut Controller, geometry: ShapeGeometry) -> i64 {
        controller.enable_draw(DrawMode::Polygon).unwrap();
        controller.start_drawing().unwrap();
        controller.finish_drawing(geometry).unwrap()
    }

    #[test]
    fn drawing_needs_the_draw_tool() {
        let (mut controller, _compute, _events) = hand_driven(SessionParameters::default());
        assert!(matches!(controller.start_drawing(), Err(Error::ToolDisabled("draw"))));

        controller.enable_draw(DrawMode::Point).unwrap();
        controller.start_drawing().unwrap();
        assert_eq!(controller.session().state(), EditState::Drawing);
        assert!(matches!(
            controller.start_modify(),
            Err(Error::InvalidTransition {
                from: EditState::Drawing,
                ..
            })
        ));
    }

    #[test]
    fn finishing_a_drawing_commits_and_dispatches_one_shape() {
        let (mut controller, compute, _events) = hand_driven(SessionParameters::default());
        let id = draw(&mut controller, ShapeGeometry::Point(point!(x: 10., y: 10.)));
        assert_eq!(id, 0);

        let shape = controller.session().shape(0).unwrap();
        assert_eq!(shape.source, SourceTag::Draw);
        assert_eq!(shape.buffer_feet, Some(50.));

        let tools = controller.session().tools();
        assert!(!tools.draw && tools.modify && tools.select);

        match compute.try_recv().unwrap() {
            ComputeJob::Start { source, items, id, .. } => {
                assert_eq!(source, JobSource::DrawingEnd);
                assert_eq!(id, -1);
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].id, 0);
            }
            other => panic!("expected a start job, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_drawings_are_not_committed() {
        let (mut controller, compute, _events) = hand_driven(SessionParameters::default());
        controller.enable_draw(DrawMode::Circle).unwrap();
        controller.start_drawing().unwrap();

        let flat = ShapeGeometry::Circle {
            center: geo::Coord { x: 0., y: 0. },
            radius: 0.,
        };
        assert!(controller.finish_drawing(flat).is_err());
        assert!(controller.session().shapes().is_empty());
        assert_eq!(controller.session().next_tracking_id(), 0);
        assert!(compute.try_recv().is_err());
    }

    #[test]
    fn modify_only_sends_changed_shapes_and_retags_them() {
        let (mut controller, compute, _events) = hand_driven(SessionParameters::default());
        controller
            .replace_shapes(
                vec![
                    ServerShape {
                        id: 10,
                        wkt: "POLYGON((0 0,100 0,100 100,0 100,0 0))".into(),
                    },
                    ServerShape {
                        id: 11,
                        wkt: "POLYGON((500 0,600 0,600 100,500 100,500 0))".into(),
                    },
                ],
                false,
            )
            .unwrap();
        let _init = compute.try_recv().unwrap();

        controller.start_modify().unwrap();
        controller.edit_shape(11, square(700.)).unwrap();
        let changed = controller.finish_modify().unwrap();
        assert_eq!(changed, vec![11]);

        assert_eq!(controller.session().shape(10).unwrap().source, SourceTag::Server);
        assert_eq!(controller.session().shape(11).unwrap().source, SourceTag::Draw);

        match compute.try_recv().unwrap() {
            ComputeJob::Start { source, items, .. } => {
                assert_eq!(source, JobSource::ModifyEnd);
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].id, 11);
                assert_eq!(items[0].edit_id, Some(1));
            }
            other => panic!("expected a start job, got {other:?}"),
        }
    }

    #[test]
    fn unusable_edits_leave_the_shape_as_it_was() {
        let (mut controller, compute, _events) = hand_driven(SessionParameters::default());
        controller
            .replace_shapes(
                vec![ServerShape {
                    id: 3,
                    wkt: "POLYGON((0 0,100 0,100 100,0 100,0 0))".into(),
                }],
                false,
            )
            .unwrap();
        let _init = compute.try_recv().unwrap();

        controller.start_modify().unwrap();
        let flat = ShapeGeometry::Circle {
            center: geo::Coord { x: 50., y: 50. },
            radius: 0.,
        };
        assert!(matches!(controller.edit_shape(3, flat), Err(Error::EmptyGeometry)));

        let shape = controller.session().shape(3).unwrap();
        assert_eq!(shape.revision, 0);
        assert!(matches!(shape.geometry, ShapeGeometry::Polygon(_)));
        assert!((shape.canonical.area() - 10_000.).abs() < 1e-6);

        assert!(controller.finish_modify().unwrap().is_empty());
        assert!(compute.try_recv().is_err());
    }

    #[test]
    fn edits_are_normalized_as_they_come_in() {
        let (mut controller, _compute, _events) = hand_driven(SessionParameters::default());
        let id = draw(&mut controller, square(0.));

        controller.start_modify().unwrap();
        controller.edit_shape(id, square(1000.)).unwrap();

        let shape = controller.session().shape(id).unwrap();
        assert_eq!(shape.revision, 1);
        let outline = shape.canonical.to_multi();
        assert!(outline.contains(&geo::Point::new(1050., 50.)));
        assert!(!outline.contains(&geo::Point::new(50., 50.)));
    }

    #[test]
    fn only_selected_shapes_are_editable() {
        let (mut controller, _compute, _events) = hand_driven(SessionParameters::default());
        let a = draw(&mut controller, square(0.));
        let b = draw(&mut controller, square(500.));
        assert_eq!(controller.session().editable_ids(), vec![a, b]);

        controller.select_by_id(b, true).unwrap();
        assert_eq!(controller.session().editable_ids(), vec![b]);

        controller.start_modify().unwrap();
        assert!(matches!(
            controller.edit_shape(a, square(50.)),
            Err(Error::UnknownShape(_))
        ));
        assert!(controller.select_by_id(99, true).is_err());
    }

    #[test]
    fn deleting_triggers_a_full_remerge() {
        let (mut controller, compute, events) = hand_driven(SessionParameters::default());
        let a = draw(&mut controller, square(0.));
        let b = draw(&mut controller, square(500.));
        while compute.try_recv().is_ok() {}

        assert!(!controller.delete_by_id(42).unwrap());
        assert!(compute.try_recv().is_err());

        assert!(controller.delete_by_id(a).unwrap());
        match compute.try_recv().unwrap() {
            ComputeJob::Flatten { source, items, .. } => {
                assert_eq!(source, JobSource::Flatten);
                assert_eq!(items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![b]);
            }
            other => panic!("expected a flatten job, got {other:?}"),
        }
        assert!(events.try_iter().any(|e| e == HostEvent::DrawingStarted));
    }

    #[test]
    fn server_ids_move_the_counter_forward_only() {
        let (mut controller, _compute, _events) = hand_driven(SessionParameters::default());
        let shapes = vec![ServerShape {
            id: 41,
            wkt: "POINT(0 0)".into(),
        }];
        controller.replace_shapes(shapes, true).unwrap();
        assert_eq!(controller.session().next_tracking_id(), 42);

        controller.replace_shapes(vec![], true).unwrap();
        assert!(controller.session().shapes().is_empty());
        assert_eq!(draw(&mut controller, square(0.)), 42);
    }

    #[test]
    fn server_ids_the_counter_cannot_pass_are_refused() {
        let (mut controller, compute, _events) = hand_driven(SessionParameters::default());
        draw(&mut controller, square(0.));
        while compute.try_recv().is_ok() {}

        for bad in [i64::MAX, -1, -20] {
            let shapes = vec![
                ServerShape {
                    id: 7,
                    wkt: "POINT(0 0)".into(),
                },
                ServerShape {
                    id: bad,
                    wkt: "POINT(10 10)".into(),
                },
            ];
            match controller.replace_shapes(shapes, true) {
                Err(Error::InvalidTrackingId(id)) => assert_eq!(id, bad),
                other => panic!("expected {bad} to be refused, got {other:?}"),
            }
        }

        assert_eq!(controller.session().shapes().len(), 1);
        assert_eq!(controller.session().next_tracking_id(), 1);
        assert!(compute.try_recv().is_err());
    }

    #[test]
    fn only_positive_buffers_are_taken() {
        let (mut controller, _compute, _events) = hand_driven(SessionParameters::default());
        controller.set_buffer(120.);
        assert_eq!(controller.session().buffer_feet(), 120.);

        for ignored in [0., -5., f64::NAN, f64::INFINITY] {
            controller.set_buffer(ignored);
            assert_eq!(controller.session().buffer_feet(), 120.);
        }
    }

    #[test]
    fn a_bad_server_shape_leaves_the_session_alone() {
        let (mut controller, compute, _events) = hand_driven(SessionParameters::default());
        draw(&mut controller, square(0.));
        while compute.try_recv().is_ok() {}

        let shapes = vec![
            ServerShape {
                id: 5,
                wkt: "POINT(0 0)".into(),
            },
            ServerShape {
                id: 6,
                wkt: "MULTIPOINT((0 0),(1 1))".into(),
            },
        ];
        assert!(matches!(
            controller.replace_shapes(shapes, true),
            Err(Error::UnsupportedGeometry(_))
        ));
        assert_eq!(controller.session().shapes().len(), 1);
        assert!(compute.try_recv().is_err());
    }

    #[test]
    fn results_for_unknown_generations_and_ids_are_dropped() {
        let (mut controller, compute, events) = hand_driven(SessionParameters::default());
        let id = draw(&mut controller, square(0.));
        let generation = compute.try_recv().unwrap().generation();

        // never dispatched
        controller
            .handle_status(ComputeStatus::Done(JobDone {
                id: -1,
                generation: generation + 7,
                source: JobSource::DrawingEnd,
                data: JobData::Items(vec![]),
            }))
            .unwrap();

        let item = |id| ItemResult {
            id,
            wkt: "POLYGON EMPTY".into(),
            area: 1.,
            edit_id: None,
            geometry: None,
        };
        controller
            .handle_status(ComputeStatus::Done(JobDone {
                id: -1,
                generation,
                source: JobSource::DrawingEnd,
                data: JobData::Items(vec![item(id), item(id + 100)]),
            }))
            .unwrap();

        let ended: Vec<i64> = events
            .try_iter()
            .filter_map(|e| match e {
                HostEvent::DrawingEnded(report) => Some(report.id),
                _ => None,
            })
            .collect();
        assert_eq!(ended, vec![id]);

        // exactly one remerge follows the delivery
        assert!(matches!(compute.try_recv(), Ok(ComputeJob::Flatten { .. })));
        assert!(compute.try_recv().is_err());
    }

    #[test]
    fn reference_items_are_committed_in_one_job() {
        let (mut controller, compute, events) = hand_driven(SessionParameters::default());
        let point = wire::shape_to_feature(
            &ShapeGeometry::Point(point!(x: 0., y: 0.)),
            UNASSIGNED_ID,
            SourceTag::Server,
            Some(20.),
        );
        let area = wire::shape_to_feature(&square(500.), UNASSIGNED_ID, SourceTag::Unknown, None);

        controller
            .handle_command(HostCommand::AddReferenceItems(vec![point, area]))
            .unwrap();

        let shapes = controller.session().shapes();
        assert_eq!(shapes.iter().map(|s| s.tracking_id).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(shapes[0].buffer_feet, Some(20.));
        assert_eq!(shapes[0].source, SourceTag::Server);

        match compute.try_recv().unwrap() {
            ComputeJob::Start { source, items, .. } => {
                assert_eq!(source, JobSource::DrawingEnd);
                assert_eq!(items.len(), 2);
            }
            other => panic!("expected a start job, got {other:?}"),
        }
        assert!(compute.try_recv().is_err());
        assert_eq!(events.try_recv().unwrap(), HostEvent::DrawingStarted);
    }

    #[test]
    fn fatal_errors_abandon_the_job() {
        let (mut controller, compute, events) = hand_driven(SessionParameters::default());
        controller.upload("a.kml".into(), "<kml/>".into()).unwrap();
        let generation = compute.try_recv().unwrap().generation();
        assert_eq!(controller.session().outstanding_jobs(), 1);

        controller
            .handle_status(ComputeStatus::UploadError(JobError {
                generation: Some(generation),
                message: "Unsupported file format: a.kml".into(),
                fatal: true,
            }))
            .unwrap();

        assert_eq!(controller.session().outstanding_jobs(), 0);
        assert!(events.try_iter().any(|e| matches!(
            e,
            HostEvent::StatusUpdate {
                status: Status::Error { .. }
            }
        )));
    }
}
