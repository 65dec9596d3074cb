use std::{sync::mpsc, time::Duration};

use super::messages::{ComputeJob, ComputeStatus};
use crate::{Error, Result};

// A dual message passing channel for the controller and the compute unit
// ComputeComms are created in pairs, one for each side,
// so they can both send and receive ComputeJob/ComputeStatus
pub struct ComputeComms<T, S> {
    sender: mpsc::Sender<T>,
    receiver: mpsc::Receiver<S>,
}

impl<T, S> ComputeComms<T, S> {
    /// Fails only when the other side has hung up
    pub fn send(&self, t: T) -> Result<()> {
        self.sender
            .send(t)
            .map_err(|_| Error::ComputeUnitDisconnected)
    }

    pub fn try_recv(&self) -> std::result::Result<S, mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv(&self) -> std::result::Result<S, mpsc::RecvError> {
        self.receiver.recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> std::result::Result<S, mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

// the generics does not really matter here
impl ComputeComms<ComputeJob, ComputeStatus> {
    /// (controller side, compute side)
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (
        ComputeComms<ComputeJob, ComputeStatus>,
        ComputeComms<ComputeStatus, ComputeJob>,
    ) {
        let (to_compute, from_controller) = mpsc::channel();
        let (to_controller, from_compute) = mpsc::channel();

        let controller_comms = ComputeComms {
            sender: to_compute,
            receiver: from_compute,
        };
        let compute_comms = ComputeComms {
            sender: to_controller,
            receiver: from_controller,
        };

        (controller_comms, compute_comms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comms::messages::JobSource;

    #[test]
    fn pairs_talk_to_each_other() {
        let (controller, compute) = ComputeComms::new();

        controller
            .send(ComputeJob::Start {
                id: -1,
                generation: 3,
                source: JobSource::DrawingEnd,
                items: vec![],
            })
            .unwrap();
        assert_eq!(compute.try_recv().unwrap().generation(), 3);

        compute.send(ComputeStatus::Calculating { generation: 3 }).unwrap();
        assert!(matches!(
            controller.recv_timeout(Duration::from_secs(1)),
            Ok(ComputeStatus::Calculating { generation: 3 })
        ));
    }

    #[test]
    fn sending_to_a_dropped_side_is_a_disconnect() {
        let (controller, compute) = ComputeComms::new();
        drop(compute);

        let sent = controller.send(ComputeJob::Start {
            id: -1,
            generation: 0,
            source: JobSource::DrawingEnd,
            items: vec![],
        });
        assert!(matches!(sent, Err(Error::ComputeUnitDisconnected)));
    }
}
