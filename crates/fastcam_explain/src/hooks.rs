//! Forward and backward capture hooks.
//!
//! A classifier owns a [`HookRegistry`] and reports the tensors of its
//! named layers through [`HookRegistry::tap`]. Every observer registered on
//! the registry keeps only the most recent tensor in a single-slot buffer.
//!
//! Hooks are not re-entrant: concurrent forward passes through one
//! registry overwrite each other's slots.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Direction of a captured gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GradientFlow {
    /// Gradient with respect to the layer output, entering the layer from above.
    Entering,
    /// Gradient leaving the layer's final operation towards its input.
    ///
    /// Observed where the classifier called
    /// [`HookRegistry::tap_pre_activation`]. Layers without that tap report
    /// the entering gradient instead.
    Leaving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CaptureKind {
    Forward,
    Backward(GradientFlow),
}

type Slot<B> = Arc<Mutex<Option<Tensor<B, 4>>>>;
type ObserverKey = (String, CaptureKind);

struct Observer<B: Backend> {
    id: u64,
    slot: Slot<B>,
}

struct RegistryState<B: Backend> {
    next_id: u64,
    observers: HashMap<ObserverKey, Vec<Observer<B>>>,
    /// Zero tensors added to tapped outputs; their gradients are the captures.
    probes: HashMap<(String, GradientFlow), Tensor<B, 4>>,
}

impl<B: Backend> RegistryState<B> {
    fn has_observers(&self, layer: &str, kind: CaptureKind) -> bool {
        self.observers
            .get(&(layer.to_string(), kind))
            .is_some_and(|observers| !observers.is_empty())
    }

    fn fill(&self, layer: &str, kind: CaptureKind, tensor: &Tensor<B, 4>) {
        if let Some(observers) = self.observers.get(&(layer.to_string(), kind)) {
            for observer in observers {
                *observer.slot.lock() = Some(tensor.clone());
            }
        }
    }

    /// Add a gradient probe to `tensor` and remember it under `layer`.
    fn probe(&mut self, layer: &str, flow: GradientFlow, tensor: Tensor<B, 4>) -> Tensor<B, 4> {
        let probe = Tensor::zeros(tensor.dims(), &tensor.device()).require_grad();
        self.probes.insert((layer.to_string(), flow), probe.clone());
        tensor + probe
    }
}

/// Registry of layer observers owned by a classifier.
///
/// Clones share the same observers.
pub struct HookRegistry<B: Backend> {
    state: Arc<Mutex<RegistryState<B>>>,
}

impl<B: Backend> HookRegistry<B> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                next_id: 0,
                observers: HashMap::new(),
                probes: HashMap::new(),
            })),
        }
    }

    /// Observe the forward output of `layer`.
    pub fn register_forward(&self, layer: &str) -> CaptureHook<B> {
        self.register(layer, CaptureKind::Forward)
    }

    /// Observe the gradient of `layer` in the given direction.
    ///
    /// Gradients are only produced on autodiff backends, by
    /// [`HookRegistry::backward`].
    pub fn register_backward(&self, layer: &str, flow: GradientFlow) -> CaptureHook<B> {
        self.register(layer, CaptureKind::Backward(flow))
    }

    fn register(&self, layer: &str, kind: CaptureKind) -> CaptureHook<B> {
        let slot: Slot<B> = Arc::new(Mutex::new(None));
        let key = (layer.to_string(), kind);

        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.observers.entry(key.clone()).or_default().push(Observer {
            id,
            slot: slot.clone(),
        });

        CaptureHook {
            layer: layer.to_string(),
            kind,
            slot,
            handle: HookHandle {
                id,
                key,
                state: Arc::downgrade(&self.state),
                attached: true,
            },
        }
    }

    /// Number of attached observers.
    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.values().map(Vec::len).sum()
    }

    /// Report the output of `layer`.
    ///
    /// Fills the forward observers of `layer`. When gradients of `layer` are
    /// observed, the returned tensor carries a gradient probe and must be
    /// used in place of `output` for the rest of the forward pass.
    pub fn tap(&self, layer: &str, output: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut state = self.state.lock();
        state.fill(layer, CaptureKind::Forward, &output);

        let wants_gradient = [GradientFlow::Entering, GradientFlow::Leaving]
            .into_iter()
            .any(|flow| state.has_observers(layer, CaptureKind::Backward(flow)));
        if !wants_gradient {
            return output;
        }

        state.probe(layer, GradientFlow::Entering, output)
    }

    /// Report the input of the final operation of `layer` (typically its
    /// rectifier), the site of [`GradientFlow::Leaving`] gradients.
    pub fn tap_pre_activation(&self, layer: &str, pre_activation: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut state = self.state.lock();
        if !state.has_observers(layer, CaptureKind::Backward(GradientFlow::Leaving)) {
            return pre_activation;
        }

        state.probe(layer, GradientFlow::Leaving, pre_activation)
    }

    /// Empty every gradient slot.
    pub fn clear_gradients(&self) {
        let state = self.state.lock();
        for ((_, kind), observers) in &state.observers {
            if matches!(kind, CaptureKind::Backward(_)) {
                for observer in observers {
                    *observer.slot.lock() = None;
                }
            }
        }
    }
}

impl<B: AutodiffBackend> HookRegistry<B> {
    /// Back-propagate `score` and fill the gradient observers.
    ///
    /// Consumes the probes of the last forward pass.
    pub fn backward(&self, score: Tensor<B, 1>) {
        let grads = score.backward();

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let probes = std::mem::take(&mut state.probes);

        for ((layer, kind), observers) in &state.observers {
            let CaptureKind::Backward(flow) = *kind else {
                continue;
            };

            let probe = probes.get(&(layer.clone(), flow)).or_else(|| match flow {
                GradientFlow::Leaving => probes.get(&(layer.clone(), GradientFlow::Entering)),
                GradientFlow::Entering => None,
            });
            let Some(gradient) = probe.and_then(|probe| probe.grad(&grads)) else {
                tracing::debug!("No gradient reached layer '{}' ({:?})", layer, flow);
                continue;
            };

            let gradient = Tensor::<B, 4>::from_inner(gradient);
            for observer in observers {
                *observer.slot.lock() = Some(gradient.clone());
            }
        }
    }
}

impl<B: Backend> Default for HookRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Clone for HookRegistry<B> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<B: Backend> std::fmt::Debug for HookRegistry<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Registration of one observer; detaches it when released or dropped.
pub struct HookHandle<B: Backend> {
    id: u64,
    key: ObserverKey,
    state: Weak<Mutex<RegistryState<B>>>,
    attached: bool,
}

impl<B: Backend> HookHandle<B> {
    /// Whether the observer is still registered.
    pub fn is_attached(&self) -> bool {
        self.attached && self.state.strong_count() > 0
    }

    /// Detach the observer from its registry.
    pub fn release(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;

        let Some(shared) = self.state.upgrade() else {
            return;
        };
        let mut state = shared.lock();
        if let Some(observers) = state.observers.get_mut(&self.key) {
            observers.retain(|observer| observer.id != self.id);
            if observers.is_empty() {
                state.observers.remove(&self.key);
            }
        }
    }
}

impl<B: Backend> Drop for HookHandle<B> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<B: Backend> std::fmt::Debug for HookHandle<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookHandle")
            .field("id", &self.id)
            .field("layer", &self.key.0)
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// An observer bound to one layer, holding the most recent capture.
#[derive(Debug)]
pub struct CaptureHook<B: Backend> {
    layer: String,
    kind: CaptureKind,
    slot: Slot<B>,
    handle: HookHandle<B>,
}

impl<B: Backend> CaptureHook<B> {
    /// Name of the observed layer.
    pub fn layer(&self) -> &str {
        &self.layer
    }

    /// Gradient direction, or `None` for a forward observer.
    pub fn gradient_flow(&self) -> Option<GradientFlow> {
        match self.kind {
            CaptureKind::Forward => None,
            CaptureKind::Backward(flow) => Some(flow),
        }
    }

    /// Most recent captured tensor.
    pub fn latest(&self) -> Option<Tensor<B, 4>> {
        self.slot.lock().clone()
    }

    /// Whether the observer is still registered.
    pub fn is_attached(&self) -> bool {
        self.handle.is_attached()
    }

    /// Detach the observer from its registry.
    pub fn release(self) {
        self.handle.release();
    }
}
