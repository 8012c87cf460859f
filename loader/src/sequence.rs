//! The boot sequence of the primary core and the path taken by the secondary cores.

use core::convert::Infallible;

use log::{debug, info};
use types::image::{ImagePlacement, KernelEntryArgs};
use types::mem::{AddrRange, PAddr, VAddr};

use crate::smp::ReleaseGate;
use crate::{load_kernel_elf, BootError, PhysicalMemory};

/// Hardware operations the boot sequence depends on. The sequence only decides when they happen.
pub trait Platform {
    /// Build the initial address space for the kernel described by `kernel`.
    fn init_boot_vspace(&self, kernel: &ImagePlacement);

    /// Turn on address translation on the calling core, using the boot address space.
    fn enable_mmu(&self);

    /// Wait for a short while in a low power state. Called between two polls of the release gate.
    fn cpu_idle(&self);

    /// Wake up secondary cores that are waiting in [`Platform::cpu_idle()`].
    fn notify_secondaries(&self);

    /// Call the kernel entry point at `entry` with `args` in the argument registers. This is not
    /// expected to return.
    fn enter_kernel(&self, entry: VAddr, args: KernelEntryArgs);
}

/// Fixed inputs of the boot sequence.
#[derive(Debug, Clone, Copy)]
pub struct BootConfig<'a> {
    pub kernel_name: &'a str,
    pub kernel_elf: &'a [u8],
    pub kernel_load_paddr: PAddr,
    /// Physical memory occupied by the loader itself.
    pub loader_footprint: AddrRange,
    /// The image the kernel starts as its first user task. Passed through as is.
    pub user_image: ImagePlacement,
}

/// Progress of the primary core. Every state is entered at most once, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootState {
    Start,
    KernelLoaded,
    VspaceInitialized,
    SecondariesReleased,
    TranslationEnabled,
    JumpedToKernel,
}

/// Drives the primary core from start until the jump into the kernel.
pub struct BootSequencer<'a, P: Platform, M: PhysicalMemory> {
    platform: &'a P,
    memory: M,
    config: BootConfig<'a>,
    kernel_info: &'a ReleaseGate<ImagePlacement>,
    state: BootState,
}

impl<'a, P: Platform, M: PhysicalMemory> BootSequencer<'a, P, M> {
    /// ### Safety
    ///
    /// The sequencer publishes `kernel_info`, see [`ReleaseGate::publish()`]: there must be only
    /// one sequencer per gate and nothing else may publish it.
    pub unsafe fn new(
        platform: &'a P,
        memory: M,
        config: BootConfig<'a>,
        kernel_info: &'a ReleaseGate<ImagePlacement>,
    ) -> Self {
        Self {
            platform,
            memory,
            config,
            kernel_info,
            state: BootState::Start,
        }
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    /// Run the boot sequence. This only returns if booting failed, in which case the caller is
    /// expected to stop the core.
    pub fn run(&mut self) -> BootError {
        match self.try_run() {
            Ok(never) => match never {},
            Err(err) => err,
        }
    }

    fn try_run(&mut self) -> Result<Infallible, BootError> {
        let config = self.config;

        let kernel = load_kernel_elf(
            config.kernel_name,
            config.kernel_elf,
            config.kernel_load_paddr,
            config.loader_footprint,
            &mut self.memory,
        )?;
        info!("Loaded {}: {}", config.kernel_name, kernel);
        self.advance(BootState::KernelLoaded);

        self.platform.init_boot_vspace(&kernel);
        self.advance(BootState::VspaceInitialized);

        let kernel = unsafe {
            // SAFETY: This sequencer is the only publisher, see `BootSequencer::new()`.
            self.kernel_info.publish(kernel)?
        };
        self.platform.notify_secondaries();
        self.advance(BootState::SecondariesReleased);

        info!("Enabling MMU and paging");
        self.platform.enable_mmu();
        self.advance(BootState::TranslationEnabled);

        let args = KernelEntryArgs::for_user_image(&config.user_image);
        debug!("Kernel arguments: {:x?}", args);
        info!("Jumping to kernel-image entry point {:#x}", kernel.virt_entry);
        self.advance(BootState::JumpedToKernel);
        self.platform.enter_kernel(kernel.virt_entry, args);

        Err(BootError::UnreachableReturn)
    }

    fn advance(&mut self, next: BootState) {
        debug!("Boot state: {:?} -> {:?}", self.state, next);
        debug_assert!(next > self.state);
        self.state = next;
    }
}

/// The path of every core but the primary one: wait until the primary core releases the kernel,
/// then enable translation and jump into the kernel with the same arguments. Only returns if the
/// kernel entry returns.
pub fn secondary_main<P: Platform>(
    platform: &P,
    kernel_info: &ReleaseGate<ImagePlacement>,
    user_image: &ImagePlacement,
) -> BootError {
    let kernel = kernel_info.wait(|| platform.cpu_idle());
    platform.enable_mmu();
    platform.enter_kernel(kernel.virt_entry, KernelEntryArgs::for_user_image(user_image));
    BootError::UnreachableReturn
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::memory::window::Window;
    use crate::LoadError;
    use elf::builder::ElfBuilder;
    use elf::Class;
    use std::sync::Mutex;
    use std::thread;

    const KERNEL_PADDR: PAddr = 0xe200000;

    const USER_IMAGE: ImagePlacement = ImagePlacement {
        phys_region_start: 0xe600000,
        phys_region_end: 0xe620000,
        virt_region_start: 0x400000,
        virt_region_end: 0x420000,
        virt_entry: 0x400000,
        phys_virt_offset: 0xe200000,
    };

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        InitVspace(ImagePlacement),
        Notify,
        EnableMmu,
        EnterKernel(VAddr, [usize; 6]),
    }

    /// Records calls. `released` captures whether the gate was open at the time of each call.
    #[derive(Default)]
    struct MockPlatform<'g> {
        events: Mutex<Vec<(Event, bool)>>,
        gate: Option<&'g ReleaseGate<ImagePlacement>>,
    }

    impl<'g> MockPlatform<'g> {
        fn watching(gate: &'g ReleaseGate<ImagePlacement>) -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                gate: Some(gate),
            }
        }

        fn record(&self, event: Event) {
            let released = self.gate.is_some_and(|gate| gate.is_released());
            self.events.lock().unwrap().push((event, released));
        }

        fn events(&self) -> Vec<(Event, bool)> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Platform for MockPlatform<'_> {
        fn init_boot_vspace(&self, kernel: &ImagePlacement) {
            self.record(Event::InitVspace(*kernel));
        }

        fn enable_mmu(&self) {
            self.record(Event::EnableMmu);
        }

        fn cpu_idle(&self) {
            thread::yield_now();
        }

        fn notify_secondaries(&self) {
            self.record(Event::Notify);
        }

        fn enter_kernel(&self, entry: VAddr, args: KernelEntryArgs) {
            self.record(Event::EnterKernel(entry, args.as_words()));
        }
    }

    fn kernel_elf() -> Vec<u8> {
        ElfBuilder::new(Class::Elf64)
            .entry(0x400100)
            .load(0x400000, 0x4000, &[0x42; 0x2000])
            .build()
    }

    fn config(kernel_elf: &[u8]) -> BootConfig<'_> {
        BootConfig {
            kernel_name: "kernel",
            kernel_elf,
            kernel_load_paddr: KERNEL_PADDR,
            loader_footprint: AddrRange::new(0x8_0000, 0x10_0000),
            user_image: USER_IMAGE,
        }
    }

    const USER_ARGS: [usize; 6] = [0xe600000, 0xe620000, 0xe200000, 0x400000, 0, 0];

    #[test]
    fn primary_boot_sequence() {
        let image = kernel_elf();
        let gate = ReleaseGate::new();
        let platform = MockPlatform::watching(&gate);
        let memory = Window::new(KERNEL_PADDR, 0x4000);

        let mut sequencer = unsafe { BootSequencer::new(&platform, memory, config(&image), &gate) };
        assert_eq!(sequencer.run(), BootError::UnreachableReturn);
        assert_eq!(sequencer.state(), BootState::JumpedToKernel);

        let kernel = *gate.get().unwrap();
        assert_eq!(kernel.phys_region_start, KERNEL_PADDR);
        assert_eq!(kernel.phys_region_end, KERNEL_PADDR + 0x4000);
        assert_eq!(kernel.virt_entry, 0x400100);
        assert_eq!(
            platform.events(),
            vec![
                (Event::InitVspace(kernel), false),
                (Event::Notify, true),
                (Event::EnableMmu, true),
                (Event::EnterKernel(0x400100, USER_ARGS), true),
            ]
        );
    }

    #[test]
    fn failed_load_stops_before_releasing() {
        let mut image = kernel_elf();
        image[0] = 0;
        let gate = ReleaseGate::new();
        let platform = MockPlatform::watching(&gate);
        let memory = Window::new(KERNEL_PADDR, 0x4000);

        let mut sequencer = unsafe { BootSequencer::new(&platform, memory, config(&image), &gate) };
        assert_eq!(
            sequencer.run(),
            BootError::Load(LoadError::ElfFormat(elf::Error::BadMagic))
        );
        assert_eq!(sequencer.state(), BootState::Start);
        assert!(!gate.is_released());
        assert!(platform.events().is_empty());
    }

    #[test]
    fn gate_published_elsewhere() {
        let image = kernel_elf();
        let gate = ReleaseGate::new();
        unsafe { gate.publish(ImagePlacement::empty()) }.unwrap();
        let platform = MockPlatform::default();
        let memory = Window::new(KERNEL_PADDR, 0x4000);

        let mut sequencer = unsafe { BootSequencer::new(&platform, memory, config(&image), &gate) };
        assert_eq!(sequencer.run(), BootError::AlreadyReleased);
        assert_eq!(sequencer.state(), BootState::VspaceInitialized);
        assert!(!platform
            .events()
            .iter()
            .any(|(event, _)| *event == Event::EnableMmu));
    }

    #[test]
    fn secondaries_enter_kernel_after_release() {
        let image = kernel_elf();
        let gate = ReleaseGate::new();
        let primary = MockPlatform::watching(&gate);
        let secondaries = [MockPlatform::watching(&gate), MockPlatform::watching(&gate)];

        thread::scope(|scope| {
            for platform in &secondaries {
                let gate = &gate;
                scope.spawn(move || {
                    assert_eq!(
                        secondary_main(platform, gate, &USER_IMAGE),
                        BootError::UnreachableReturn
                    );
                });
            }
            let memory = Window::new(KERNEL_PADDR, 0x4000);
            let mut sequencer =
                unsafe { BootSequencer::new(&primary, memory, config(&image), &gate) };
            assert_eq!(sequencer.run(), BootError::UnreachableReturn);
        });

        for platform in &secondaries {
            assert_eq!(
                platform.events(),
                vec![
                    (Event::EnableMmu, true),
                    (Event::EnterKernel(0x400100, USER_ARGS), true),
                ]
            );
        }
    }
}
