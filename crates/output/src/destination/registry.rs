//! 목적지 레지스트리 -- 경로별 공유와 참조 카운트
//!
//! 목적지는 슬롯 벡터에 저장되고 [`DestinationId`]는 (인덱스, 세대) 쌍입니다.
//! 해제된 슬롯을 재사용할 때 세대가 증가하므로 오래된 ID는 감지됩니다.

use std::collections::HashMap;
use std::path::PathBuf;

use logroute_core::metrics as m;

use crate::destination::{Destination, DestinationSpec};
use crate::error::OutputError;

/// 레지스트리 안의 목적지 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DestinationId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    dest: Option<Destination>,
}

/// 목적지 레지스트리
#[derive(Debug, Default)]
pub struct DestinationRegistry {
    slots: Vec<Slot>,
    by_path: HashMap<PathBuf, DestinationId>,
    free: Vec<usize>,
}

impl DestinationRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 등록된 목적지 수
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// 경로로 목적지 ID를 찾습니다.
    pub fn find(&self, path: &std::path::Path) -> Option<DestinationId> {
        self.by_path.get(path).copied()
    }

    /// 같은 경로의 목적지를 재사용하거나 새로 등록합니다.
    ///
    /// `bare`가 참이면(경로만 지정된 요청) 기존 목적지를 속성과 관계없이 공유합니다.
    /// 기존 목적지와 속성이 다르면 설정 에러입니다.
    pub fn open_or_reuse(
        &mut self,
        spec: DestinationSpec,
        bare: bool,
    ) -> Result<DestinationId, OutputError> {
        if let Some(id) = self.find(&spec.path) {
            let existing = self.get(id).ok_or_else(|| stale(id))?;
            if !bare && *existing.spec() != spec {
                return Err(OutputError::config(
                    spec.path.display().to_string(),
                    "conflicting options for an existing destination",
                ));
            }
            self.retain(id)?;
            return Ok(id);
        }

        let path = spec.path.clone();
        let dest = Destination::new(spec);
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.generation = slot.generation.wrapping_add(1);
                slot.dest = Some(dest);
                DestinationId {
                    index: index as u32,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    dest: Some(dest),
                });
                DestinationId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        self.by_path.insert(path, id);
        metrics::gauge!(m::OUTPUT_DESTINATIONS_ACTIVE).increment(1.0);
        Ok(id)
    }

    /// 목적지를 조회합니다. 해제된 ID는 `None`입니다.
    pub fn get(&self, id: DestinationId) -> Option<&Destination> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.dest.as_ref())
    }

    /// 목적지를 가변 조회합니다.
    pub fn get_mut(&mut self, id: DestinationId) -> Option<&mut Destination> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.dest.as_mut())
    }

    /// 참조 카운트를 증가시킵니다.
    pub fn retain(&mut self, id: DestinationId) -> Result<(), OutputError> {
        let dest = self.get_mut(id).ok_or_else(|| stale(id))?;
        dest.refcount += 1;
        Ok(())
    }

    /// 참조 카운트를 감소시키고, 0이 되면 중복 요약을 기록하고 닫은 뒤 슬롯을 해제합니다.
    ///
    /// 이미 해제된 ID는 디버그 빌드에서 패닉, 릴리스 빌드에서 에러 로그와 함께
    /// `State` 에러입니다. 슬롯이 해제되면 `true`를 반환합니다.
    pub fn release(&mut self, id: DestinationId, now: i64) -> Result<bool, OutputError> {
        let Some(dest) = self.get_mut(id) else {
            debug_assert!(false, "release of freed destination {id:?}");
            tracing::error!(?id, "release of freed destination");
            return Err(stale(id));
        };

        dest.refcount = dest.refcount.saturating_sub(1);
        if dest.refcount > 0 {
            return Ok(false);
        }

        if let Err(e) = dest.flush_pending(now) {
            tracing::warn!(path = %dest.spec().path.display(), error = %e, "flush on release failed");
        }
        dest.close();

        let slot = &mut self.slots[id.index as usize];
        if let Some(dest) = slot.dest.take() {
            self.by_path.remove(&dest.spec().path);
        }
        self.free.push(id.index as usize);
        metrics::gauge!(m::OUTPUT_DESTINATIONS_ACTIVE).decrement(1.0);
        Ok(true)
    }

    /// 살아 있는 모든 목적지
    pub fn iter(&self) -> impl Iterator<Item = (DestinationId, &Destination)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.dest.as_ref().map(|d| {
                (
                    DestinationId {
                        index: i as u32,
                        generation: s.generation,
                    },
                    d,
                )
            })
        })
    }

    /// 살아 있는 모든 목적지 (가변)
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (DestinationId, &mut Destination)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| {
            let generation = s.generation;
            s.dest.as_mut().map(|d| {
                (
                    DestinationId {
                        index: i as u32,
                        generation,
                    },
                    d,
                )
            })
        })
    }

    /// 모든 목적지의 중복 요약을 기록하고 닫습니다. 아카이브는 만들지 않습니다.
    pub fn shutdown(&mut self, now: i64) {
        for (_, dest) in self.iter_mut() {
            if let Err(e) = dest.flush_pending(now) {
                tracing::warn!(path = %dest.spec().path.display(), error = %e, "flush on shutdown failed");
            }
            dest.close();
        }
    }
}

fn stale(id: DestinationId) -> OutputError {
    OutputError::State(format!(
        "destination {}#{} is not registered",
        id.index, id.generation
    ))
}
