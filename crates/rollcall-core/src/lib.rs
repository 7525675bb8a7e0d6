//! rollcall-core
//!
//! Scheduling and verification engine for a daily, time-windowed,
//! two-phase (mark → verify) workflow.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（MemberKey, Member, MemberPatch, ActionWindow, outcome, events, errors）
//! - **ports**: 抽象化レイヤー（Clock, MemberStore, ActionClient, Notifier）
//! - **impls**: 実装（InMemoryMemberStore, HttpActionClient, LogNotifier, scripted doubles）
//! - **app**: アプリケーションロジック（config, trigger, orchestrator, verifier, reset, builder）
//! - **otp**: ワンタイムコードの発行と照合

pub mod app;
pub mod domain;
pub mod impls;
pub mod otp;
pub mod ports;
