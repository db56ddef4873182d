//! Collective communication used to share the loss normalizer across workers.

use crate::common::*;

/// A group of workers that reduce tensors together.
///
/// Every member must call [`all_reduce_sum`](ProcessGroup::all_reduce_sum)
/// the same number of times in the same order, otherwise the call blocks.
pub trait ProcessGroup {
    /// The number of workers in the group.
    fn world_size(&self) -> usize;

    /// The index of this worker.
    fn rank(&self) -> usize;

    /// Sum the tensor elementwise over all workers.
    ///
    /// The output has the shape, kind and device of the input.
    fn all_reduce_sum(&self, tensor: &Tensor) -> Result<Tensor>;
}

/// The trivial group of a single worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl ProcessGroup for SingleProcess {
    fn world_size(&self) -> usize {
        1
    }

    fn rank(&self) -> usize {
        0
    }

    fn all_reduce_sum(&self, tensor: &Tensor) -> Result<Tensor> {
        Ok(tensor.shallow_clone())
    }
}

#[derive(Debug)]
struct Message {
    rank: usize,
    round: u64,
    values: Vec<f64>,
}

#[derive(Debug, Default)]
struct GroupState {
    round: u64,
    pending: Vec<Message>,
}

/// An in-process group where each member lives on its own thread.
#[derive(Debug)]
pub struct ChannelGroup {
    rank: usize,
    /// Senders indexed by rank, without the member's own.
    peers: Vec<Option<flume::Sender<Message>>>,
    receiver: flume::Receiver<Message>,
    state: Mutex<GroupState>,
}

impl ChannelGroup {
    /// Create all members of a group of `world_size` workers.
    ///
    /// The members are ordered by rank.
    pub fn new_group(world_size: usize) -> Result<Vec<Self>> {
        ensure!(world_size >= 1, "world_size must be positive");

        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..world_size).map(|_| flume::unbounded()).unzip();

        let members = receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| Self {
                rank,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(peer, sender)| (peer != rank).then(|| sender.clone()))
                    .collect(),
                receiver,
                state: Mutex::new(GroupState::default()),
            })
            .collect();

        Ok(members)
    }

    fn world_size_(&self) -> usize {
        self.peers.len()
    }
}

impl ProcessGroup for ChannelGroup {
    fn world_size(&self) -> usize {
        self.world_size_()
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn all_reduce_sum(&self, tensor: &Tensor) -> Result<Tensor> {
        let world_size = self.world_size_();
        let mut state = self
            .state
            .lock()
            .map_err(|_| format_err!("the state of rank {} is poisoned", self.rank))?;
        let round = state.round;
        state.round += 1;

        let local: Vec<f64> = Vec::from(&tensor.to_kind(Kind::Double).reshape(&[-1]));

        self.peers
            .iter()
            .enumerate()
            .filter_map(|(rank, sender)| Some((rank, sender.as_ref()?)))
            .try_for_each(|(rank, sender)| {
                sender
                    .send(Message {
                        rank: self.rank,
                        round,
                        values: local.clone(),
                    })
                    .map_err(|_| format_err!("rank {} is disconnected", rank))
            })?;

        // peers may be one round ahead, so keep their messages for later
        let mut received: Vec<Message> = vec![];
        let mut index = 0;
        while index < state.pending.len() {
            if state.pending[index].round == round {
                received.push(state.pending.swap_remove(index));
            } else {
                index += 1;
            }
        }

        while received.len() < world_size - 1 {
            let message = self
                .receiver
                .recv()
                .map_err(|_| format_err!("the group of rank {} is disconnected", self.rank))?;
            if message.round == round {
                received.push(message);
            } else {
                state.pending.push(message);
            }
        }

        // sum in rank order so that every member gets identical values
        received.push(Message {
            rank: self.rank,
            round,
            values: local,
        });
        received.sort_by_key(|message| message.rank);

        let mut sum = vec![0f64; received[0].values.len()];
        received.iter().try_for_each(|message| {
            ensure!(
                message.values.len() == sum.len(),
                "rank {} sent {} values, but expect {}",
                message.rank,
                message.values.len(),
                sum.len()
            );
            sum.iter_mut()
                .zip(&message.values)
                .for_each(|(lhs, rhs)| *lhs += rhs);
            Ok(())
        })?;

        let output = Tensor::of_slice(&sum)
            .view(tensor.size().as_slice())
            .to_kind(tensor.kind())
            .to_device(tensor.device());
        Ok(output)
    }
}
