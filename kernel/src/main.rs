//! Boot simulation: brings the VM system up on a hosted machine, runs one
//! process through enough faults to push it into swap, and shuts down.

use std::process;
use std::sync::Arc;
use vmos::system::{alloc_kpages, free_kpages, vm_bootstrap, vm_fault, vm_shutdown, vm_system};
use vmos::user_program::{ExecutableImage, RegionFlags};
use vmos::vm::{FaultKind, ProcessContext, VmConfig, VmSpace};
use vmos_shared::mem::PAGE_FRAME_SIZE;
use vmos_shared::{eprintln, println};

const TEXT_BASE: usize = 0x40_0000;
const TEXT_PAGES: usize = 4;
const DATA_BASE: usize = 0x1000_0000;
const DATA_PAGES: usize = 48;
const DATA_FILE_PAGES: usize = 2;

struct Process {
    space: Option<VmSpace>,
}

impl ProcessContext for Process {
    fn current_vmspace(&mut self) -> Option<&mut VmSpace> {
        self.space.as_mut()
    }

    fn kill_current_process(&mut self, exit_code: i32) -> ! {
        eprintln!("init exited with code {exit_code}");
        process::exit(1);
    }
}

fn executable() -> ExecutableImage {
    let len = (TEXT_PAGES + DATA_FILE_PAGES) * PAGE_FRAME_SIZE;
    let bytes: Vec<u8> = (0..len).map(|i| (i / PAGE_FRAME_SIZE) as u8 + 1).collect();
    ExecutableImage::new(bytes)
}

fn fault(kind: FaultKind, addr: usize, process: &mut Process) {
    if let Err(err) = vm_fault(kind as u32, addr, process) {
        eprintln!("fault at {addr:#x} failed: {err}");
        process::exit(1);
    }
}

fn main() {
    let config = VmConfig {
        ram_size: 64 * PAGE_FRAME_SIZE,
        swap_file_size: 128 * PAGE_FRAME_SIZE,
        ..VmConfig::default()
    };

    println!("Bootstrapping VM system");
    if let Err(err) = vm_bootstrap(config) {
        eprintln!("VM bootstrap failed: {err}");
        process::exit(1);
    }
    println!("VM system up!");

    let Some(scratch) = alloc_kpages(2) else {
        eprintln!("no room for kernel pages");
        process::exit(1);
    };
    println!("Kernel pages at {scratch:#x}");
    free_kpages(scratch);

    println!("Loading init");
    let space = {
        let mut vm = vm_system().lock();
        let mut space = vm.create_vmspace(Arc::new(executable()));
        let loaded = space
            .addrspace
            .define_region(
                TEXT_BASE,
                TEXT_PAGES * PAGE_FRAME_SIZE,
                0,
                TEXT_PAGES * PAGE_FRAME_SIZE,
                RegionFlags::new(true, false, true),
            )
            .and_then(|()| {
                space.addrspace.define_region(
                    DATA_BASE,
                    DATA_PAGES * PAGE_FRAME_SIZE,
                    TEXT_PAGES * PAGE_FRAME_SIZE,
                    DATA_FILE_PAGES * PAGE_FRAME_SIZE,
                    RegionFlags::new(true, true, false),
                )
            })
            .and_then(|()| space.addrspace.prepare_load(vm.frames_mut()));
        if let Err(err) = loaded {
            eprintln!("loading init failed: {err}");
            process::exit(1);
        }
        space.addrspace.activate(&mut *vm);
        space
    };
    let stack_pointer = space.addrspace.define_stack();
    let mut init = Process { space: Some(space) };
    println!("init loaded, stack at {stack_pointer:#x}");

    println!("Running init");
    for pass in 0..2 {
        for page in 0..TEXT_PAGES {
            fault(FaultKind::Read, TEXT_BASE + page * PAGE_FRAME_SIZE, &mut init);
        }
        for page in 0..DATA_PAGES {
            fault(FaultKind::Write, DATA_BASE + page * PAGE_FRAME_SIZE, &mut init);
        }
        fault(FaultKind::Write, stack_pointer - 4, &mut init);

        let vm = vm_system().lock();
        println!(
            "pass {pass}: {} frames free, {} swap slots used",
            vm.frames().frames_free(),
            vm.swap().slots_in_use()
        );
    }

    if let Some(space) = init.space.take() {
        space.destroy(&mut *vm_system().lock());
    }
    println!("init exited");

    vm_shutdown();
}
